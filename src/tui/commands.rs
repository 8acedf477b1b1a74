//! `:` command line.

use gridshare_core::FormulaTemplate;
use gridshare_model::model::CellRange;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    /// Switch to a sheet by name or id.
    Sheet(String),
    AddSheet,
    /// Delete the named sheet, or the active one.
    DeleteSheet(Option<String>),
    RenameSheet(String),
    RenameSpreadsheet(String),
    Share(String),
    Unshare(String),
    Users,
    Color {
        color: String,
        range: Option<CellRange>,
    },
    TextColor {
        color: String,
        range: Option<CellRange>,
    },
    NoColor(Option<CellRange>),
    Formula(FormulaTemplate),
    Reconnect,
    Goto(CellRange),
    Undo,
    Redo,
}

/// Parse a `#RRGGBB` color.
pub fn parse_color(text: &str) -> Option<String> {
    let hex = text.strip_prefix('#')?;
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", hex.to_ascii_uppercase()))
    } else {
        None
    }
}

fn parse_range_arg(arg: Option<&str>) -> Result<Option<CellRange>, String> {
    match arg {
        None => Ok(None),
        Some(text) => CellRange::parse(text)
            .map(Some)
            .ok_or_else(|| format!("Invalid range: {text}")),
    }
}

fn parse_color_args(args: Option<&str>, usage: &str) -> Result<(String, Option<CellRange>), String> {
    let mut parts = args.unwrap_or("").split_whitespace();
    let color = parts
        .next()
        .and_then(parse_color)
        .ok_or_else(|| usage.to_string())?;
    let range = parse_range_arg(parts.next())?;
    if parts.next().is_some() {
        return Err(usage.to_string());
    }
    Ok((color, range))
}

fn required(args: Option<&str>, usage: &str) -> Result<String, String> {
    args.filter(|a| !a.is_empty())
        .map(str::to_string)
        .ok_or_else(|| usage.to_string())
}

/// Parse the text typed after `:`. Errors are usage messages for the
/// status line.
pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let command = parts[0];
    let args = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

    match command {
        "q" | "quit" => Ok(Command::Quit),
        "sheet" => required(args, "Usage: :sheet NAME").map(Command::Sheet),
        "addsheet" => Ok(Command::AddSheet),
        "delsheet" => Ok(Command::DeleteSheet(args.map(str::to_string))),
        "renamesheet" => required(args, "Usage: :renamesheet NAME").map(Command::RenameSheet),
        "rename" => required(args, "Usage: :rename NAME").map(Command::RenameSpreadsheet),
        "share" => required(args, "Usage: :share USERNAME").map(Command::Share),
        "unshare" => required(args, "Usage: :unshare USERNAME").map(Command::Unshare),
        "users" => Ok(Command::Users),
        "color" => {
            let (color, range) = parse_color_args(args, "Usage: :color #RRGGBB [RANGE]")?;
            Ok(Command::Color { color, range })
        }
        "textcolor" => {
            let (color, range) = parse_color_args(args, "Usage: :textcolor #RRGGBB [RANGE]")?;
            Ok(Command::TextColor { color, range })
        }
        "nocolor" => parse_range_arg(args).map(Command::NoColor),
        "formula" => {
            let name = required(args, "Usage: :formula SUM|AVERAGE|MAX|MIN|COUNT|ADD|SUB|MUL|DIV")?;
            FormulaTemplate::from_name(&name)
                .map(Command::Formula)
                .ok_or_else(|| format!("Unknown formula template: {name}"))
        }
        "reconnect" => Ok(Command::Reconnect),
        "goto" | "g" => {
            let target = required(args, "Usage: :goto CELL or RANGE (e.g., :goto B7)")?;
            CellRange::parse(&target)
                .map(Command::Goto)
                .ok_or_else(|| format!("Invalid cell reference: {target}"))
        }
        "undo" | "u" => Ok(Command::Undo),
        "redo" => Ok(Command::Redo),
        "" => Err(String::new()),
        other => Err(format!("Unknown command: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridshare_model::model::CellRef;

    #[test]
    fn test_sheet_commands() {
        assert_eq!(parse_command("sheet Totals"), Ok(Command::Sheet("Totals".into())));
        assert_eq!(parse_command("addsheet"), Ok(Command::AddSheet));
        assert_eq!(parse_command("delsheet"), Ok(Command::DeleteSheet(None)));
        assert_eq!(
            parse_command("delsheet Sheet2"),
            Ok(Command::DeleteSheet(Some("Sheet2".into())))
        );
        assert_eq!(
            parse_command("renamesheet  Q1 2024 "),
            Ok(Command::RenameSheet("Q1 2024".into()))
        );
        assert!(parse_command("sheet").is_err());
    }

    #[test]
    fn test_color_commands() {
        assert_eq!(
            parse_command("color #fff9c4"),
            Ok(Command::Color {
                color: "#FFF9C4".into(),
                range: None
            })
        );
        assert_eq!(
            parse_command("textcolor #000000 A2:B4"),
            Ok(Command::TextColor {
                color: "#000000".into(),
                range: Some(CellRange::new(CellRef::new(2, 1), CellRef::new(4, 2)))
            })
        );
        assert!(parse_command("color red").is_err());
        assert!(parse_command("color #12345").is_err());
        assert!(parse_command("color #123456 A1:B2 extra").is_err());
        assert_eq!(parse_command("nocolor"), Ok(Command::NoColor(None)));
        assert!(parse_command("nocolor Z").is_err());
    }

    #[test]
    fn test_formula_and_goto() {
        assert_eq!(
            parse_command("formula sum"),
            Ok(Command::Formula(FormulaTemplate::Sum))
        );
        assert!(parse_command("formula median").is_err());
        assert_eq!(
            parse_command("goto b7"),
            Ok(Command::Goto(CellRange::single(CellRef::new(7, 2))))
        );
        assert!(parse_command("goto A101").is_err());
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(parse_command("q"), Ok(Command::Quit));
        assert_eq!(parse_command("share bob"), Ok(Command::Share("bob".into())));
        assert_eq!(parse_command("users"), Ok(Command::Users));
        assert_eq!(parse_command("reconnect"), Ok(Command::Reconnect));
        assert_eq!(parse_command("bogus"), Err("Unknown command: bogus".into()));
    }
}
