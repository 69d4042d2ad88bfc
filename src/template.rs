//! Template engine for descriptors and definitions
//!
//! Tokens are written `{{NAME}}`. The token set is closed:
//!
//! - static tokens, known before anything is provisioned (`CURRENT_USER`,
//!   `CURRENT_USER_NAME`, `TODAY`, `CATALOG`, `SCHEMA`, `BUNDLE_NAME`,
//!   `BUNDLE_FOLDER`), substituted in the raw descriptor before parsing;
//! - dynamic tokens, `DYNAMIC_<KIND>_ID_<logical id>` and
//!   `SHARED_WAREHOUSE_ID`, substituted once the ids exist.
//!
//! Any other token is rejected.

use provision::ResourceKind;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}")
        .unwrap_or_else(|e| panic!("token grammar does not compile: {e}"))
});

/// A recognised template token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    CurrentUser,
    CurrentUserName,
    Today,
    Catalog,
    Schema,
    BundleName,
    BundleFolder,
    SharedWarehouseId,
    Dynamic { kind: ResourceKind, id: String },
}

impl Token {
    pub fn is_static(&self) -> bool {
        !matches!(self, Token::Dynamic { .. } | Token::SharedWarehouseId)
    }
}

impl FromStr for Token {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = match s {
            "CURRENT_USER" => Token::CurrentUser,
            "CURRENT_USER_NAME" => Token::CurrentUserName,
            "TODAY" => Token::Today,
            "CATALOG" => Token::Catalog,
            "SCHEMA" => Token::Schema,
            "BUNDLE_NAME" => Token::BundleName,
            "BUNDLE_FOLDER" => Token::BundleFolder,
            "SHARED_WAREHOUSE_ID" => Token::SharedWarehouseId,
            _ => {
                let (kind, id) = s
                    .strip_prefix("DYNAMIC_")
                    .and_then(|rest| rest.split_once("_ID_"))
                    .ok_or_else(|| TemplateError::UnknownToken(s.to_string()))?;
                let kind = ResourceKind::from_token_name(kind)
                    .ok_or_else(|| TemplateError::UnknownToken(s.to_string()))?;
                if id.is_empty() {
                    return Err(TemplateError::UnknownToken(s.to_string()));
                }
                Token::Dynamic {
                    kind,
                    id: id.to_string(),
                }
            }
        };
        Ok(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::CurrentUser => f.write_str("CURRENT_USER"),
            Token::CurrentUserName => f.write_str("CURRENT_USER_NAME"),
            Token::Today => f.write_str("TODAY"),
            Token::Catalog => f.write_str("CATALOG"),
            Token::Schema => f.write_str("SCHEMA"),
            Token::BundleName => f.write_str("BUNDLE_NAME"),
            Token::BundleFolder => f.write_str("BUNDLE_FOLDER"),
            Token::SharedWarehouseId => f.write_str("SHARED_WAREHOUSE_ID"),
            Token::Dynamic { kind, id } => write!(f, "DYNAMIC_{}_ID_{id}", kind.token_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown template token {{{{{0}}}}}")]
    UnknownToken(String),
}

/// Values of the static tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub user: String,
    pub catalog: String,
    pub schema: String,
    pub bundle_name: String,
    pub bundle_folder: String,
    /// `%Y-%m-%d`
    pub today: String,
}

impl TemplateVars {
    pub fn today() -> String {
        chrono::Local::now().format("%Y-%m-%d").to_string()
    }

    /// Local part of the user email, non-alphanumerics replaced by `_`
    pub fn user_name(&self) -> String {
        let local = self
            .user
            .rfind('@')
            .map_or(self.user.as_str(), |at| &self.user[..at]);
        local
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

/// Text after dynamic substitution, with the tokens that had no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub unresolved: Vec<String>,
}

/// Substitutes template tokens. Owned by one installation.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    vars: TemplateVars,
    ids: BTreeMap<(ResourceKind, String), String>,
    shared_warehouse: Option<String>,
}

impl TemplateEngine {
    pub fn new(vars: TemplateVars) -> Self {
        Self {
            vars,
            ids: BTreeMap::new(),
            shared_warehouse: None,
        }
    }

    pub fn vars(&self) -> &TemplateVars {
        &self.vars
    }

    /// Record a provisioned id for `DYNAMIC_<KIND>_ID_<id>`
    pub fn set_id(&mut self, kind: ResourceKind, logical_id: &str, uid: &str) {
        self.ids
            .insert((kind, logical_id.to_string()), uid.to_string());
    }

    pub fn set_shared_warehouse(&mut self, uid: &str) {
        self.shared_warehouse = Some(uid.to_string());
    }

    /// Substitute static tokens. Dynamic tokens are left in place; anything
    /// unrecognised is an error.
    pub fn render_static(&self, text: &str) -> Result<String, TemplateError> {
        self.substitute(text, |token| {
            Ok(token.is_static().then(|| self.static_value(token)))
        })
    }

    /// Substitute dynamic tokens with the ids recorded so far.
    pub fn render_dynamic(&self, text: &str) -> Rendered {
        let mut unresolved = Vec::new();
        let result = self.substitute(text, |token| {
            let value = match token {
                Token::Dynamic { kind, id } => self.ids.get(&(*kind, id.clone())).cloned(),
                Token::SharedWarehouseId => self.shared_warehouse.clone(),
                _ => Some(self.static_value(token)),
            };
            if value.is_none() {
                unresolved.push(token.to_string());
            }
            Ok(value)
        });
        unresolved.sort();
        unresolved.dedup();
        Rendered {
            // Only unknown tokens fail, and they were rejected before parsing.
            text: result.unwrap_or_else(|_| text.to_string()),
            unresolved,
        }
    }

    fn static_value(&self, token: &Token) -> String {
        match token {
            Token::CurrentUser => self.vars.user.clone(),
            Token::CurrentUserName => self.vars.user_name(),
            Token::Today => self.vars.today.clone(),
            Token::Catalog => self.vars.catalog.clone(),
            Token::Schema => self.vars.schema.clone(),
            Token::BundleName => self.vars.bundle_name.clone(),
            Token::BundleFolder => self.vars.bundle_folder.clone(),
            Token::SharedWarehouseId | Token::Dynamic { .. } => String::new(),
        }
    }

    fn substitute<F>(&self, text: &str, mut value_of: F) -> Result<String, TemplateError>
    where
        F: FnMut(&Token) -> Result<Option<String>, TemplateError>,
    {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for caps in TOKEN.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let token: Token = name.as_str().parse()?;
            if let Some(value) = value_of(&token)? {
                out.push_str(&text[cursor..whole.start()]);
                out.push_str(&value);
                cursor = whole.end();
            }
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }
}

static BUILD_CATALOG_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`?main_{1,2}build`").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});
static BUILD_CATALOG_DOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"main_{1,2}build\.").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// Rewrites the catalog and schema a bundle was built against into the
/// ones it is installed into.
///
/// Bundles are built in a `main__build` (or `main_build`) catalog, which
/// always maps back to `main`. When the bundle supports a custom schema,
/// `default_catalog.default_schema` (optionally backquoted) becomes
/// `` `catalog`.`schema` ``.
#[derive(Debug, Clone)]
pub struct SchemaRewrite {
    target: Option<(Regex, String)>,
}

impl SchemaRewrite {
    pub fn new(
        custom_schema_supported: bool,
        default_catalog: &str,
        default_schema: &str,
        catalog: &str,
        schema: &str,
    ) -> Self {
        let target = custom_schema_supported
            .then(|| {
                let pattern = format!(
                    r"`?{}`?\.`?{}`?",
                    regex::escape(default_catalog),
                    regex::escape(default_schema)
                );
                Regex::new(&pattern).ok()
            })
            .flatten()
            .map(|re| (re, format!("`{catalog}`.`{schema}`")));
        Self { target }
    }

    /// Leaves text untouched apart from the build catalog
    pub fn identity() -> Self {
        Self { target: None }
    }

    pub fn apply(&self, text: &str) -> String {
        let text = BUILD_CATALOG_QUOTED.replace_all(text, "main");
        let text = BUILD_CATALOG_DOT.replace_all(&text, "main.");
        match &self.target {
            Some((re, replacement)) => re.replace_all(&text, replacement.as_str()).into_owned(),
            None => text.into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(TemplateVars {
            user: "jane.doe-x@example.com".to_string(),
            catalog: "main".to_string(),
            schema: "retail".to_string(),
            bundle_name: "lakehouse-retail".to_string(),
            bundle_folder: "/Users/jane.doe-x@example.com/lakebundle/lakehouse-retail".to_string(),
            today: "2026-10-19".to_string(),
        })
    }

    #[test]
    fn test_static_tokens() {
        let text = r#"{"owner": "{{CURRENT_USER}}", "name": "{{CURRENT_USER_NAME}}_{{BUNDLE_NAME}}", "day": "{{TODAY}}", "t": "{{CATALOG}}.{{SCHEMA}}"}"#;
        let out = engine().render_static(text).unwrap();
        assert_eq!(
            out,
            r#"{"owner": "jane.doe-x@example.com", "name": "jane_doe_x_lakehouse-retail", "day": "2026-10-19", "t": "main.retail"}"#
        );
    }

    #[test]
    fn test_static_pass_keeps_dynamic_tokens() {
        let text = "{{DYNAMIC_PIPELINE_ID_ingest}} {{SHARED_WAREHOUSE_ID}} {{BUNDLE_FOLDER}}";
        let out = engine().render_static(text).unwrap();
        assert_eq!(
            out,
            "{{DYNAMIC_PIPELINE_ID_ingest}} {{SHARED_WAREHOUSE_ID}} /Users/jane.doe-x@example.com/lakebundle/lakehouse-retail"
        );
    }

    #[test]
    fn test_unknown_token_rejected() {
        let err = engine().render_static("{{DEMO_NAME}}").unwrap_err();
        assert_eq!(err, TemplateError::UnknownToken("DEMO_NAME".to_string()));
        assert_eq!(err.to_string(), "unknown template token {{DEMO_NAME}}");
        assert!(engine().render_static("{{DYNAMIC_VOLUME_ID_x}}").is_err());
    }

    #[test]
    fn test_dynamic_tokens() {
        let mut engine = engine();
        engine.set_id(ResourceKind::Pipeline, "ingest", "p-1");
        engine.set_shared_warehouse("wh-9");

        let rendered = engine.render_dynamic(
            r#"{"pipeline_id": "{{DYNAMIC_PIPELINE_ID_ingest}}", "legacy": "{{DYNAMIC_DLT_ID_ingest}}", "wh": "{{SHARED_WAREHOUSE_ID}}", "missing": "{{DYNAMIC_PIPELINE_ID_other}}"}"#,
        );
        assert_eq!(
            rendered.text,
            r#"{"pipeline_id": "p-1", "legacy": "p-1", "wh": "wh-9", "missing": "{{DYNAMIC_PIPELINE_ID_other}}"}"#
        );
        assert_eq!(rendered.unresolved, vec!["DYNAMIC_PIPELINE_ID_other".to_string()]);
    }

    #[test]
    fn test_token_parsing() {
        assert_eq!(
            "DYNAMIC_QUERY_ROOM_ID_chat_bot".parse::<Token>().unwrap(),
            Token::Dynamic {
                kind: ResourceKind::QueryRoom,
                id: "chat_bot".to_string()
            }
        );
        assert!("DYNAMIC_PIPELINE_ID_".parse::<Token>().is_err());
    }

    #[test]
    fn test_schema_rewrite_build_catalog() {
        let rewrite = SchemaRewrite::identity();
        assert_eq!(
            rewrite.apply("SELECT * FROM main__build.retail.sales JOIN `main_build`.retail.x"),
            "SELECT * FROM main.retail.sales JOIN main.retail.x"
        );
    }

    #[test]
    fn test_schema_rewrite_custom_schema() {
        let rewrite = SchemaRewrite::new(true, "main", "retail", "dev", "team_retail");
        assert_eq!(
            rewrite.apply("FROM main.retail.sales, `main`.`retail`.customers"),
            "FROM `dev`.`team_retail`.sales, `dev`.`team_retail`.customers"
        );
        let unsupported = SchemaRewrite::new(false, "main", "retail", "dev", "team_retail");
        assert_eq!(unsupported.apply("FROM main.retail.sales"), "FROM main.retail.sales");
    }
}
