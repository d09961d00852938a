use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::models::{License, PolicyVerdict, Severity};

const CONFIG_DIR: &str = ".dep-checkr";
const APP_DIR: &str = "dep-checkr";
const CONFIG_FILE: &str = "config.toml";

/// Root configuration structure, deserialized from `.dep-checkr/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Local policy: license actions, maintenance window and vulnerability floor.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Action for any license not listed in `licenses`.
    #[serde(default = "default_policy_action")]
    pub default: PolicyAction,
    /// Per-license overrides keyed by SPDX identifier (e.g. `"MIT"`, `"GPL-3.0"`).
    #[serde(default)]
    pub licenses: HashMap<String, PolicyAction>,
    /// A package released within this many years counts as maintained when
    /// its metadata does not say either way.
    #[serde(default = "default_maintained_years")]
    pub maintained_years: u32,
    /// Scanner findings below this severity are ignored.
    #[serde(default)]
    pub min_severity: Severity,
}

fn default_policy_action() -> PolicyAction {
    PolicyAction::Warn
}

fn default_maintained_years() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Pass,
    Warn,
    /// The license is rejected and the package cannot be approved.
    Error,
}

impl PolicyAction {
    pub fn to_verdict(self) -> PolicyVerdict {
        match self {
            PolicyAction::Pass => PolicyVerdict::Pass,
            PolicyAction::Warn => PolicyVerdict::Warn,
            PolicyAction::Error => PolicyVerdict::Error,
        }
    }
}

impl Default for PolicyConfig {
    /// Permissive licenses pass and copyleft warns. Nothing is an error: a
    /// license is only rejected locally when a config file says so.
    fn default() -> Self {
        let licenses = [
            ("MIT", PolicyAction::Pass),
            ("Apache-2.0", PolicyAction::Pass),
            ("BSD-2-Clause", PolicyAction::Pass),
            ("BSD-3-Clause", PolicyAction::Pass),
            ("ISC", PolicyAction::Pass),
            ("PSF-2.0", PolicyAction::Pass),
            ("Unlicense", PolicyAction::Pass),
            ("Zlib", PolicyAction::Pass),
            ("CC0-1.0", PolicyAction::Pass),
            ("LGPL-2.1", PolicyAction::Warn),
            ("LGPL-3.0", PolicyAction::Warn),
            ("MPL-2.0", PolicyAction::Warn),
            ("EPL-2.0", PolicyAction::Warn),
            ("GPL-2.0", PolicyAction::Warn),
            ("GPL-3.0", PolicyAction::Warn),
            ("AGPL-3.0", PolicyAction::Warn),
            ("unknown", PolicyAction::Warn),
        ]
        .into_iter()
        .map(|(id, action)| (id.to_string(), action))
        .collect();

        PolicyConfig {
            default: default_policy_action(),
            licenses,
            maintained_years: default_maintained_years(),
            min_severity: Severity::None,
        }
    }
}

/// Load the policy configuration, searching in order:
///
/// 1. `config_override` (`--config`)
/// 2. `<input_dir>/.dep-checkr/config.toml`
/// 3. `~/.config/dep-checkr/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(input_dir: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let candidates: Vec<PathBuf> = std::iter::once(input_dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .chain(dirs::home_dir().map(|home| home.join(".config").join(APP_DIR).join(CONFIG_FILE)))
        .collect();

    for path in candidates {
        if path.exists() {
            return read_config(&path);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!(path = %path.display(), "loaded policy configuration");
    Ok(config)
}

/// Policy verdict for a resolved license. A composite license is a choice
/// between its members, so it is evaluated as their `OR`.
pub fn license_verdict(config: &Config, license: &License) -> PolicyVerdict {
    apply_policy(config, Some(&license.canonical().to_expression()))
}

/// Policy verdict for an SPDX identifier or expression.
///
/// `AND` binds tighter than `OR`, parentheses group, and a `WITH` exception is
/// skipped so the base license decides. A `/` is read as `OR`.
pub fn apply_policy(config: &Config, license_spdx: Option<&str>) -> PolicyVerdict {
    let license = license_spdx.unwrap_or("unknown");

    if let Some(action) = config.policy.licenses.get(license) {
        return action.to_verdict();
    }

    let tokens = tokenize(&license.replace('/', " OR "));
    ExprParser {
        tokens,
        pos: 0,
        config,
    }
    .parse_or()
}

#[derive(Debug, PartialEq, Clone)]
enum Token {
    Id(String),
    And,
    Or,
    With,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Vec<Token> {
    let spaced = expr.replace('(', " ( ").replace(')', " ) ");
    spaced
        .split_whitespace()
        .map(|word| match word {
            "(" => Token::LParen,
            ")" => Token::RParen,
            "AND" | "and" => Token::And,
            "OR" | "or" => Token::Or,
            "WITH" | "with" => Token::With,
            id => Token::Id(id.to_string()),
        })
        .collect()
}

/// Recursive descent over:
/// ```text
/// or_expr  := and_expr ( "OR" and_expr )*
/// and_expr := atom ( "AND" atom )*
/// atom     := "(" or_expr ")" | id ( "WITH" id )?
/// ```
struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    config: &'a Config,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // Either license may be chosen: the most permissive one decides.
    fn parse_or(&mut self) -> PolicyVerdict {
        let mut verdict = self.parse_and();
        while self.peek() == Some(&Token::Or) {
            self.bump();
            verdict = verdict.min(self.parse_and());
        }
        verdict
    }

    // Both licenses apply: the most restrictive one decides.
    fn parse_and(&mut self) -> PolicyVerdict {
        let mut verdict = self.parse_atom();
        while self.peek() == Some(&Token::And) {
            self.bump();
            verdict = verdict.max(self.parse_atom());
        }
        verdict
    }

    fn parse_atom(&mut self) -> PolicyVerdict {
        match self.bump() {
            Some(Token::LParen) => {
                let verdict = self.parse_or();
                if self.peek() == Some(&Token::RParen) {
                    self.bump();
                }
                verdict
            }
            Some(Token::Id(id)) => {
                if self.peek() == Some(&Token::With) {
                    self.bump();
                    self.bump();
                }
                self.lookup(&id)
            }
            _ => self.config.policy.default.to_verdict(),
        }
    }

    fn lookup(&self, id: &str) -> PolicyVerdict {
        self.config
            .policy
            .licenses
            .get(id)
            .copied()
            .unwrap_or(self.config.policy.default)
            .to_verdict()
    }
}
