//! Declarative directory-listing parser (§4.6, L1).
//!
//! Replaces ad hoc per-format regexes with a small rule engine: a
//! listing line is matched against an ordered list of rules, each built
//! from a fixed catalogue of tokeniser functions ([`functions`]). A
//! [`server_type::ServerType`] groups a rule set with a column schema
//! and an autodetection condition; [`engine::RuleSet::parse_listing`]
//! is the entry point callers use once a type is known.

pub mod columns;
pub mod engine;
pub mod functions;
pub mod server_type;

pub use columns::{ColumnId, ColumnSpec, ColumnTypeTag, ColumnValue};
pub use engine::{Rule, RuleSet};
pub use functions::ParseContext;
pub use server_type::{detect, AutodetectExpr, ServerType};

use crate::ftp::types::{FtpEntry, FtpEntryKind};

/// Unix `ls -l`-style listing, e.g.
/// `-rw-r--r-- 1 user group 4096 Jan 02 12:34 file.txt` or
/// `lrwxrwxrwx 1 user group 11 Jan 02 12:34 link -> target`.
// The link-count field between permissions and owner has no column of
// its own; it's parsed into `size` and then immediately overwritten by
// the real size field later in the same rule.
pub const UNIX_RULE_SOURCE: &str = r#"
* word(permissions) white_spaces(?) positive_number(size)
  white_spaces(?) word(owner) white_spaces(?) word(group)
  white_spaces(?) positive_number(size) white_spaces(?)
  month_3(month) white_spaces(?) day(day) white_spaces(?)
  year_or_time(year,time) white_spaces(?)
  unix_link(is_dir,name,link_target) ;
"#;

/// Windows/IIS `dir`-style listing, e.g.
/// `07-30-26  12:34PM       <DIR>          sub` or
/// `07-30-26  12:34PM             4096 file.txt`.
pub const WINDOWS_RULE_SOURCE: &str = r#"
* month(month) all(1) day(day) all(1) year(year)
  white_spaces(?) time(time) white_spaces(?)
  all_up_to(permissions,"DIR>") all(4) assign(is_dir,"true") white_spaces(?)
  rest_of_line(name) ;
* month(month) all(1) day(day) all(1) year(year)
  white_spaces(?) time(time) white_spaces(?)
  positive_number(size) white_spaces(?) rest_of_line(name) ;
"#;

/// Bare-minimum, always-available fallback: permissions/size columns are
/// left empty; only a name and a directory flag via trailing `/` are
/// extracted. Used when no declared server type parses a sample line.
pub const GENERIC_RULE_SOURCE: &str = r#"
* rest_of_line(name) ;
"#;

/// Build the built-in catalogue of server types, in the order they
/// should be tried during autodetection (§4.6): specific types before
/// the generic fallback.
pub fn built_in_server_types() -> Vec<ServerType> {
    vec![
        ServerType {
            name: "unix".into(),
            autodetect: AutodetectExpr::Or(
                Box::new(AutodetectExpr::SystContains("UNIX".into())),
                Box::new(AutodetectExpr::SystContains("L8".into())),
            ),
            rules: RuleSet::compile(UNIX_RULE_SOURCE).expect("built-in unix rules compile"),
            columns: default_unix_columns(),
        },
        ServerType {
            name: "windows".into(),
            autodetect: AutodetectExpr::Or(
                Box::new(AutodetectExpr::SystContains("Windows_NT".into())),
                Box::new(AutodetectExpr::WelcomeContains("Microsoft FTP".into())),
            ),
            rules: RuleSet::compile(WINDOWS_RULE_SOURCE).expect("built-in windows rules compile"),
            columns: default_windows_columns(),
        },
        ServerType {
            name: "generic".into(),
            autodetect: AutodetectExpr::Always,
            rules: RuleSet::compile(GENERIC_RULE_SOURCE).expect("built-in generic rule compiles"),
            columns: vec![],
        },
    ]
}

fn default_unix_columns() -> Vec<ColumnSpec> {
    use ColumnTypeTag::*;
    vec![
        spec(ColumnId::Permissions, Text, "permission bits"),
        spec(ColumnId::Owner, Text, "owner"),
        spec(ColumnId::Group, Text, "group"),
        spec(ColumnId::Size, Number, "size in bytes"),
        spec(ColumnId::Month, Number, "modification month"),
        spec(ColumnId::Day, Number, "modification day"),
        spec(ColumnId::Year, Number, "modification year"),
        spec(ColumnId::Time, Text, "modification time"),
        spec(ColumnId::Name, Text, "file name"),
        spec(ColumnId::LinkTarget, Text, "symlink target"),
    ]
}

fn default_windows_columns() -> Vec<ColumnSpec> {
    use ColumnTypeTag::*;
    vec![
        spec(ColumnId::Month, Number, "modification month"),
        spec(ColumnId::Day, Number, "modification day"),
        spec(ColumnId::Year, Number, "modification year"),
        spec(ColumnId::Time, Text, "modification time"),
        spec(ColumnId::Size, Number, "size in bytes"),
        spec(ColumnId::Name, Text, "file name"),
    ]
}

fn spec(id: ColumnId, tag: ColumnTypeTag, description: &str) -> ColumnSpec {
    ColumnSpec {
        id,
        display_name: None,
        type_tag: tag,
        description: description.to_string(),
        empty_value: String::new(),
        align_right: matches!(tag, ColumnTypeTag::Number),
        visible: true,
    }
}

/// Parse an `MLSD`/`MLST` fact listing (RFC 3659 §7). Each line is
/// `fact=value;fact=value;... name`; unlike the line-oriented formats
/// above this is key/value and doesn't need the rule engine.
pub fn parse_mlsd(text: &str) -> Vec<FtpEntry> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_mlsd_line)
        .collect()
}

fn parse_mlsd_line(line: &str) -> Option<FtpEntry> {
    let (facts_part, name) = line.rsplit_once(' ')?;
    let mut facts = std::collections::HashMap::new();
    for fact in facts_part.split(';') {
        if let Some((k, v)) = fact.split_once('=') {
            facts.insert(k.to_lowercase(), v.to_string());
        }
    }

    let kind = match facts.get("type").map(String::as_str) {
        Some("dir") | Some("cdir") | Some("pdir") => FtpEntryKind::Directory,
        Some(t) if t.starts_with("OS.unix=slink") => FtpEntryKind::Symlink,
        _ => FtpEntryKind::File,
    };
    let size = facts.get("size").and_then(|s| s.parse().ok()).unwrap_or(0);
    let modified = facts.get("modify").and_then(|m| parse_mlsd_time(m));

    Some(FtpEntry {
        name: name.to_string(),
        kind,
        size,
        modified,
        permissions: facts.get("unix.mode").cloned().or_else(|| facts.get("perm").cloned()),
        owner: facts.get("unix.owner").cloned(),
        group: facts.get("unix.group").cloned(),
        link_target: None,
        raw: Some(line.to_string()),
        facts,
        year_assumed: false,
    })
}

fn parse_mlsd_time(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{NaiveDateTime, TimeZone, Utc};
    let fmt = if s.len() > 14 { "%Y%m%d%H%M%S%.f" } else { "%Y%m%d%H%M%S" };
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn built_in_types_compile() {
        let types = built_in_server_types();
        assert_eq!(types.len(), 3);
    }

    #[test]
    fn unix_detection_and_parse() {
        let types = built_in_server_types();
        let sample = "-rw-r--r-- 1 user group 4096 Jan 02 12:34 file.txt";
        let chosen = detect(&types, "220 vsftpd ready", "215 UNIX Type: L8", sample).unwrap();
        assert_eq!(chosen.name, "unix");
        let entries = chosen.rules.parse_listing(sample, Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap());
        assert_eq!(entries[0].name, "file.txt");
        assert_eq!(entries[0].kind, FtpEntryKind::File);
    }

    #[test]
    fn mlsd_parses_dir_and_file() {
        let text = "type=cdir;perm=el; .\r\ntype=dir;perm=el;modify=20240102123400; sub\r\ntype=file;size=42;modify=20240102123400; a.txt\r\n";
        let entries = parse_mlsd(text);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].kind, FtpEntryKind::Directory);
        assert_eq!(entries[2].size, 42);
        assert!(entries[2].modified.is_some());
    }
}
