//! Console commands for the terminal client.
//!
//! Stands in for the pointer and window events a graphical host would deliver.

use plaza_shared::math::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Primary click; `None` clicks on empty sky.
    Click(Option<Vec3>),
    Back,
    Resize(u32, u32),
    Status,
    Quit,
}

pub const USAGE: &str = "Commands: click <x> <y> <z> | click | back | resize <w> <h> | status | quit";

/// Parses one console line. `Ok(None)` for blank input.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&head) = tokens.first() else {
        return Ok(None);
    };

    let cmd = match (head, &tokens[1..]) {
        ("click", []) => ConsoleCommand::Click(None),
        ("click", [x, y, z]) => {
            ConsoleCommand::Click(Some(Vec3::new(number(x)?, number(y)?, number(z)?)))
        }
        ("click", _) => return Err("Usage: click <x> <y> <z>".to_string()),
        ("back" | "leave", []) => ConsoleCommand::Back,
        ("resize", [w, h]) => ConsoleCommand::Resize(size(w)?, size(h)?),
        ("resize", _) => return Err("Usage: resize <w> <h>".to_string()),
        ("status", []) => ConsoleCommand::Status,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => return Err(format!("Unknown command: {line}. {USAGE}")),
    };
    Ok(Some(cmd))
}

fn number(s: &str) -> Result<f32, String> {
    s.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("not a number: {s}"))
}

fn size(s: &str) -> Result<u32, String> {
    s.parse().map_err(|_| format!("not a size: {s}"))
}
