use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use super::Toolchain;
use crate::output::{OutputFormat, exit, print_json, symbols};

/// List registered formats in priority order with their tool availability.
pub fn cmd_formats(toolchain: &Toolchain, output: OutputFormat) -> Result<u8> {
  let descriptors = toolchain.registry.list_all();

  if output.is_json() {
    let formats: Vec<_> = descriptors
      .iter()
      .map(|d| {
        serde_json::json!({
          "id": d.format_id,
          "priority": d.priority,
          "extension": d.instance.output_extension(),
          "available": d.instance.check_available(),
        })
      })
      .collect();
    print_json(&formats)?;
    return Ok(exit::SUCCESS);
  }

  println!("Registered formats:");
  for d in descriptors {
    let status = if d.instance.check_available() {
      format!("{}", symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()))
    } else {
      format!(
        "{} {}",
        symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
        "tools missing".if_supports_color(Stream::Stdout, |s| s.dimmed())
      )
    };
    println!(
      "  {:<20} priority {}  .{:<8} {}",
      d.format_id,
      d.priority,
      d.instance.output_extension(),
      status
    );
  }
  Ok(exit::SUCCESS)
}
