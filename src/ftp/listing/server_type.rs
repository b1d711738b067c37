//! Server-type autodetection and persistence (§4.6, §6).
//!
//! A [`ServerType`] bundles a column schema, a compiled rule set, and an
//! autodetect condition evaluated against the login welcome banner and
//! the `SYST` response. Detection tries, in declaration order, every
//! type whose condition is true; if none of those actually parses a
//! sample of the listing, every remaining type is tried in order too.

use crate::ftp::error::{FtpError, FtpResult, RuleError};
use crate::ftp::listing::columns::ColumnSpec;
use crate::ftp::listing::engine::RuleSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Boolean expression over welcome banner / `SYST` text (§4.6).
#[derive(Debug, Clone)]
pub enum AutodetectExpr {
    WelcomeContains(String),
    SystContains(String),
    RegexInWelcome(Regex),
    RegexInSyst(Regex),
    And(Box<AutodetectExpr>, Box<AutodetectExpr>),
    Or(Box<AutodetectExpr>, Box<AutodetectExpr>),
    Not(Box<AutodetectExpr>),
    /// Always true — the catch-all fallback type.
    Always,
}

impl AutodetectExpr {
    pub fn eval(&self, welcome: &str, syst: &str) -> bool {
        match self {
            AutodetectExpr::WelcomeContains(s) => welcome.contains(s.as_str()),
            AutodetectExpr::SystContains(s) => syst.contains(s.as_str()),
            AutodetectExpr::RegexInWelcome(re) => re.is_match(welcome),
            AutodetectExpr::RegexInSyst(re) => re.is_match(syst),
            AutodetectExpr::And(a, b) => a.eval(welcome, syst) && b.eval(welcome, syst),
            AutodetectExpr::Or(a, b) => a.eval(welcome, syst) || b.eval(welcome, syst),
            AutodetectExpr::Not(a) => !a.eval(welcome, syst),
            AutodetectExpr::Always => true,
        }
    }
}

/// A complete recognised server type: name, detection rule, listing
/// grammar and column schema.
#[derive(Debug, Clone)]
pub struct ServerType {
    pub name: String,
    pub autodetect: AutodetectExpr,
    pub rules: RuleSet,
    pub columns: Vec<ColumnSpec>,
}

/// Try every type whose autodetect condition holds, in order, keeping
/// the first that successfully parses `sample_listing`; fall back to
/// every remaining type, in order, under the same test.
pub fn detect<'a>(
    types: &'a [ServerType],
    welcome: &str,
    syst: &str,
    sample_listing: &str,
) -> Option<&'a ServerType> {
    let (matched, rest): (Vec<&ServerType>, Vec<&ServerType>) =
        types.iter().partition(|t| t.autodetect.eval(welcome, syst));

    matched
        .into_iter()
        .find(|t| parses_sample(&t.rules, sample_listing))
        .or_else(|| rest.into_iter().find(|t| parses_sample(&t.rules, sample_listing)))
}

fn parses_sample(rules: &RuleSet, sample: &str) -> bool {
    let mut ctx = crate::ftp::listing::functions::ParseContext::new(1970, 1, 1);
    sample
        .lines()
        .filter(|l| !l.trim().is_empty())
        .all(|l| rules.parse_line(l, &mut ctx).is_some())
}

// ─── Autodetect expression parser ───────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    LParen,
    RParen,
}

fn lex(src: &str) -> Result<Vec<Tok>, RuleError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            toks.push(Tok::LParen);
            i += 1;
        } else if c == ')' {
            toks.push(Tok::RParen);
            i += 1;
        } else if c == '"' {
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    Some('"') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        s.push(*ch);
                        i += 1;
                    }
                    None => return Err(RuleError::UnterminatedString),
                }
            }
            toks.push(Tok::Str(s));
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '(' && chars[i] != ')' {
                i += 1;
            }
            toks.push(Tok::Ident(chars[start..i].iter().collect()));
        }
    }
    Ok(toks)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<AutodetectExpr, RuleError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("or")) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = AutodetectExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<AutodetectExpr, RuleError> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek(), Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("and")) {
            self.next();
            let rhs = self.parse_unary()?;
            lhs = AutodetectExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<AutodetectExpr, RuleError> {
        match self.peek() {
            Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("not") => {
                self.next();
                Ok(AutodetectExpr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Tok::LParen) => {
                self.next();
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(RuleError::UnbalancedParens),
                }
            }
            Some(Tok::Ident(_)) => self.parse_call(),
            _ => Err(RuleError::UnbalancedParens),
        }
    }

    fn parse_call(&mut self) -> Result<AutodetectExpr, RuleError> {
        let name = match self.next() {
            Some(Tok::Ident(n)) => n,
            _ => return Err(RuleError::UnexpectedEof("autodetect expression".into())),
        };
        match self.next() {
            Some(Tok::LParen) => {}
            _ => {
                return Err(RuleError::BadArgument {
                    func: name,
                    detail: "expected '('".into(),
                })
            }
        }
        let arg = match self.next() {
            Some(Tok::Str(s)) => s,
            _ => {
                return Err(RuleError::BadArgument {
                    func: name,
                    detail: "expected string literal".into(),
                })
            }
        };
        match self.next() {
            Some(Tok::RParen) => {}
            _ => {
                return Err(RuleError::BadArgument {
                    func: name,
                    detail: "expected ')'".into(),
                })
            }
        }
        match name.as_str() {
            "welcome_contains" => Ok(AutodetectExpr::WelcomeContains(arg)),
            "syst_contains" => Ok(AutodetectExpr::SystContains(arg)),
            "reg_exp_in_welcome" => Regex::new(&arg)
                .map(AutodetectExpr::RegexInWelcome)
                .map_err(|e| RuleError::BadArgument {
                    func: name,
                    detail: e.to_string(),
                }),
            "reg_exp_in_syst" => Regex::new(&arg)
                .map(AutodetectExpr::RegexInSyst)
                .map_err(|e| RuleError::BadArgument {
                    func: name,
                    detail: e.to_string(),
                }),
            other => Err(RuleError::UnknownFunction(other.to_string())),
        }
    }
}

/// Compile an autodetect expression (e.g.
/// `welcome_contains("Pure-FTPd") or reg_exp_in_syst("UNIX Type: L8")`).
pub fn compile_autodetect(src: &str) -> Result<AutodetectExpr, RuleError> {
    if src.trim().is_empty() {
        return Ok(AutodetectExpr::Always);
    }
    let toks = lex(src)?;
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.toks.len() {
        return Err(RuleError::UnbalancedParens);
    }
    Ok(expr)
}

// ─── `.str` file persistence ─────────────────────────────────────────

const STR_MAGIC: &[u8; 4] = b"STR1";
const STR_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedServerType {
    name: String,
    autodetect_source: String,
    rule_source: String,
    columns: Vec<ColumnSpec>,
}

/// Serialize a list of server types to the `.str` container: a 4-byte
/// magic, a version byte, then JSON. Unknown JSON fields are ignored on
/// load (serde's default behaviour) so older readers tolerate newer
/// writers within the same major version.
pub fn save_to_file(path: &Path, types: &[(ServerType, String, String)]) -> FtpResult<()> {
    let persisted: Vec<PersistedServerType> = types
        .iter()
        .map(|(t, autodetect_source, rule_source)| PersistedServerType {
            name: t.name.clone(),
            autodetect_source: autodetect_source.clone(),
            rule_source: rule_source.clone(),
            columns: t.columns.clone(),
        })
        .collect();

    let mut buf = Vec::new();
    buf.extend_from_slice(STR_MAGIC);
    buf.push(STR_VERSION);
    let json = serde_json::to_vec(&persisted).map_err(|e| FtpError::invalid_config(e.to_string()))?;
    buf.extend_from_slice(&json);
    fs::write(path, buf).map_err(FtpError::from)
}

/// Load and compile a list of server types from a `.str` file.
pub fn load_from_file(path: &Path) -> FtpResult<Vec<ServerType>> {
    let bytes = fs::read(path).map_err(FtpError::from)?;
    if bytes.len() < 5 || &bytes[0..4] != STR_MAGIC {
        return Err(RuleError::BadMagic.into());
    }
    let version = bytes[4];
    if version > STR_VERSION {
        return Err(RuleError::UnsupportedVersion(version).into());
    }
    let persisted: Vec<PersistedServerType> =
        serde_json::from_slice(&bytes[5..]).map_err(|e| FtpError::invalid_config(e.to_string()))?;

    persisted
        .into_iter()
        .map(|p| {
            let autodetect = compile_autodetect(&p.autodetect_source)?;
            let rules = RuleSet::compile(&p.rule_source)?;
            Ok(ServerType {
                name: p.name,
                autodetect,
                rules,
                columns: p.columns,
            })
        })
        .collect::<Result<Vec<_>, RuleError>>()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_contains_matches() {
        let expr = compile_autodetect(r#"welcome_contains("Pure-FTPd")"#).unwrap();
        assert!(expr.eval("220 Pure-FTPd ready", ""));
        assert!(!expr.eval("220 vsFTPd ready", ""));
    }

    #[test]
    fn and_or_not_precedence() {
        let expr =
            compile_autodetect(r#"welcome_contains("vsftpd") or (syst_contains("UNIX") and not syst_contains("L8"))"#)
                .unwrap();
        assert!(expr.eval("220 vsftpd", "215 UNIX Type: L8"));
        assert!(expr.eval("220 something", "215 UNIX Type: something-else"));
    }

    #[test]
    fn regex_condition() {
        let expr = compile_autodetect(r#"reg_exp_in_syst("UNIX Type: L[0-9]")"#).unwrap();
        assert!(expr.eval("", "215 UNIX Type: L8"));
        assert!(!expr.eval("", "215 Windows_NT"));
    }

    #[test]
    fn empty_expression_is_always_true() {
        let expr = compile_autodetect("").unwrap();
        assert!(expr.eval("anything", "anything"));
    }
}
