//! Server configuration parsing.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use autocd_core::executor::{EnvVars, ExecutorConfig};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult, parse_duration};

/// Environment variable that overrides `webhook.secret`.
pub const SECRET_ENV_VAR: &str = "AUTOCD_WEBHOOK_SECRET";

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub webhook: WebhookConfig,
    pub scripts: ScriptsConfig,
    pub logs: LogConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub port: u16,
    /// Route the Event Gate listens on. Always starts with `/`.
    pub path: String,
    /// Shared secret used to verify `X-Hub-Signature-256`.
    pub secret: String,
    /// Largest request body accepted.
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            path: "/webhook".to_string(),
            secret: String::new(),
            // GitHub caps webhook payloads at 25 MB.
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Directory holding the scripts.
    pub path: PathBuf,
    /// Script run for `push` events.
    pub push: String,
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub shell: PathBuf,
    /// Environment applied to every run.
    pub env: EnvVars,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./scripts"),
            push: "push".to_string(),
            timeout: ExecutorConfig::DEFAULT_TIMEOUT,
            max_concurrent: ExecutorConfig::DEFAULT_MAX_CONCURRENT,
            shell: PathBuf::from(ExecutorConfig::DEFAULT_SHELL),
            env: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `autocd_executor=debug`.
    pub level: String,
    pub format: LogFormat,
    /// Optional log file, rotated daily.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// Operator API settings. The `/runs` routes exist only when a token is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    pub token: Option<String>,
}

impl AppConfig {
    /// Executor settings derived from the `scripts` section.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::new(&self.scripts.path)
            .with_timeout(self.scripts.timeout)
            .with_max_concurrent(self.scripts.max_concurrent)
            .with_default_env(self.scripts.env.clone())
            .with_shell(&self.scripts.shell)
            .normalized()
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(SECRET_ENV_VAR) {
            self.webhook.secret = secret;
        }
    }
}

/// Read and parse a configuration file, then apply environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<AppConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let mut config = parse_config(&content)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Parse a configuration from KDL text. Missing sections keep their defaults.
pub fn parse_config(kdl: &str) -> ConfigResult<AppConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = AppConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "webhook" => parse_webhook(node, &mut config.webhook)?,
            "scripts" => parse_scripts(node, &mut config.scripts)?,
            "logs" => parse_logs(node, &mut config.logs)?,
            "admin" => parse_admin(node, &mut config.admin),
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_webhook(node: &KdlNode, webhook: &mut WebhookConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "port" => {
                let port = get_first_int_arg(child)
                    .ok_or_else(|| invalid("webhook.port", "expected an integer"))?;
                webhook.port = u16::try_from(port)
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| {
                        invalid("webhook.port", format!("{} is not a valid port", port))
                    })?;
            }
            "path" => {
                let path = get_first_string_arg(child).unwrap_or_default();
                if !path.starts_with('/') {
                    return Err(invalid(
                        "webhook.path",
                        format!("{:?} must start with '/'", path),
                    ));
                }
                webhook.path = path;
            }
            "secret" => {
                webhook.secret = get_first_string_arg(child).unwrap_or_default();
            }
            "max-body-bytes" | "max_body_bytes" => {
                let limit = get_first_int_arg(child).unwrap_or(0);
                webhook.max_body_bytes = usize::try_from(limit)
                    .ok()
                    .filter(|l| *l > 0)
                    .ok_or_else(|| {
                        invalid("webhook.max-body-bytes", "expected a positive integer")
                    })?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_scripts(node: &KdlNode, scripts: &mut ScriptsConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "path" => {
                let path = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("scripts.path".to_string()))?;
                scripts.path = PathBuf::from(path);
            }
            "push" => {
                scripts.push = get_first_string_arg(child)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| ConfigError::MissingField("scripts.push".to_string()))?;
            }
            "timeout" => {
                let timeout = match (get_first_string_arg(child), get_first_int_arg(child)) {
                    (Some(text), _) => parse_duration(&text).map_err(|_| {
                        invalid("scripts.timeout", format!("cannot parse {:?}", text))
                    })?,
                    (None, Some(secs)) => Duration::from_secs(u64::try_from(secs).unwrap_or(0)),
                    (None, None) => Duration::ZERO,
                };
                // Unset or non-positive falls back to the default.
                scripts.timeout = if timeout.is_zero() {
                    ExecutorConfig::DEFAULT_TIMEOUT
                } else {
                    timeout
                };
            }
            "max-concurrent" | "max_concurrent" => {
                let max = get_first_int_arg(child).unwrap_or(0);
                scripts.max_concurrent = usize::try_from(max)
                    .ok()
                    .filter(|m| *m > 0)
                    .unwrap_or(ExecutorConfig::DEFAULT_MAX_CONCURRENT);
            }
            "shell" => {
                if let Some(shell) = get_first_string_arg(child) {
                    scripts.shell = PathBuf::from(shell);
                }
            }
            "env" => {
                for var in children(child) {
                    let key = var.name().value().to_string();
                    if let Some(value) = get_first_scalar_arg(var) {
                        scripts.env.push((key, value));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_logs(node: &KdlNode, logs: &mut LogConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "level" => {
                if let Some(level) = get_first_string_arg(child) {
                    logs.level = level;
                }
            }
            "format" => {
                let format = get_first_string_arg(child).unwrap_or_default();
                logs.format = format
                    .parse()
                    .map_err(|message: String| invalid("logs.format", message))?;
            }
            "file" | "path" => {
                logs.file = get_first_string_arg(child)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from);
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_admin(node: &KdlNode, admin: &mut AdminConfig) {
    for child in children(node) {
        if child.name().value() == "token" {
            admin.token = get_first_string_arg(child).filter(|t| !t.is_empty());
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

// Helper functions for extracting values from KDL nodes

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes().iter())
}

fn first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    first_arg(node).and_then(|v| v.as_integer())
}

/// First argument as text, accepting strings, integers and booleans.
fn get_first_scalar_arg(node: &KdlNode) -> Option<String> {
    let value = first_arg(node)?;
    value
        .as_string()
        .map(|s| s.to_string())
        .or_else(|| value.as_integer().map(|i| i.to_string()))
        .or_else(|| value.as_bool().map(|b| b.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            webhook {
                port 9000
                path "/hooks/github"
                secret "s3cr3t"
                max-body-bytes 1048576
            }
            scripts {
                path "/srv/blog/scripts"
                push "deploy.sh"
                timeout "90s"
                max-concurrent 2
                shell "/bin/sh"
                env {
                    HEXO_ENV "production"
                    RETRIES 3
                }
            }
            logs {
                level "debug"
                format "json"
                file "/var/log/autocd/webhooks.log"
            }
            admin {
                token "operator"
            }
        "#;

        let config = parse_config(kdl).unwrap();
        assert_eq!(config.webhook.port, 9000);
        assert_eq!(config.webhook.path, "/hooks/github");
        assert_eq!(config.webhook.secret, "s3cr3t");
        assert_eq!(config.webhook.max_body_bytes, 1048576);
        assert_eq!(config.scripts.path, PathBuf::from("/srv/blog/scripts"));
        assert_eq!(config.scripts.push, "deploy.sh");
        assert_eq!(config.scripts.timeout, Duration::from_secs(90));
        assert_eq!(config.scripts.max_concurrent, 2);
        assert_eq!(config.scripts.shell, PathBuf::from("/bin/sh"));
        assert_eq!(
            config.scripts.env,
            vec![
                ("HEXO_ENV".to_string(), "production".to_string()),
                ("RETRIES".to_string(), "3".to_string()),
            ]
        );
        assert_eq!(config.logs.level, "debug");
        assert_eq!(config.logs.format, LogFormat::Json);
        assert_eq!(
            config.logs.file,
            Some(PathBuf::from("/var/log/autocd/webhooks.log"))
        );
        assert_eq!(config.admin.token.as_deref(), Some("operator"));
    }

    #[test]
    fn test_defaults_for_empty_document() {
        let config = parse_config("").unwrap();
        assert_eq!(config.webhook.port, 8080);
        assert_eq!(config.webhook.path, "/webhook");
        assert!(config.webhook.secret.is_empty());
        assert_eq!(config.scripts.path, PathBuf::from("./scripts"));
        assert_eq!(config.scripts.push, "push");
        assert_eq!(config.scripts.timeout, Duration::from_secs(300));
        assert_eq!(config.scripts.max_concurrent, 5);
        assert_eq!(config.logs.level, "info");
        assert_eq!(config.logs.format, LogFormat::Text);
        assert!(config.logs.file.is_none());
        assert!(config.admin.token.is_none());
    }

    #[test]
    fn test_non_positive_limits_fall_back_to_defaults() {
        let kdl = r#"
            scripts {
                timeout "0s"
                max-concurrent -3
            }
        "#;
        let config = parse_config(kdl).unwrap();
        assert_eq!(config.scripts.timeout, ExecutorConfig::DEFAULT_TIMEOUT);
        assert_eq!(config.scripts.max_concurrent, 5);

        let config = parse_config("scripts {\n timeout -10\n max-concurrent 0\n}").unwrap();
        assert_eq!(config.scripts.timeout, ExecutorConfig::DEFAULT_TIMEOUT);
        assert_eq!(config.scripts.max_concurrent, 5);
    }

    #[test]
    fn test_integer_timeout_is_seconds() {
        let config = parse_config("scripts {\n timeout 45\n}").unwrap();
        assert_eq!(config.scripts.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            r#"webhook { path "webhook" }"#,
            r#"webhook { port 70000 }"#,
            r#"webhook { port "http" }"#,
            r#"scripts { timeout "soon" }"#,
            r#"logs { format "xml" }"#,
        ];
        for kdl in cases {
            assert!(
                matches!(parse_config(kdl), Err(ConfigError::InvalidValue { .. })),
                "{} should be rejected",
                kdl
            );
        }
    }

    #[test]
    fn test_empty_push_script_is_rejected() {
        let result = parse_config(r#"scripts { push "" }"#);
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_malformed_kdl() {
        assert!(matches!(
            parse_config("webhook { port 8080"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let config = parse_config(r#"ssl { enabled #true }"#).unwrap();
        assert_eq!(config.webhook.port, 8080);
    }

    #[test]
    fn test_env_override_replaces_secret() {
        let mut config = parse_config(r#"webhook { secret "from-file" }"#).unwrap();
        config.apply_env_overrides(|key| {
            (key == SECRET_ENV_VAR).then(|| "from-env".to_string())
        });
        assert_eq!(config.webhook.secret, "from-env");

        config.apply_env_overrides(|_| None);
        assert_eq!(config.webhook.secret, "from-env");
    }

    #[test]
    fn test_executor_config() {
        let config = parse_config(
            r#"
            scripts {
                path "/srv/scripts"
                timeout "2m"
                max-concurrent 3
                env { SITE "blog" }
            }
        "#,
        )
        .unwrap();

        let executor = config.executor_config();
        assert_eq!(executor.scripts_dir, PathBuf::from("/srv/scripts"));
        assert_eq!(executor.timeout, Duration::from_secs(120));
        assert_eq!(executor.max_concurrent, 3);
        assert_eq!(
            executor.default_env,
            vec![("SITE".to_string(), "blog".to_string())]
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "webhook {{\n port 8181\n}}").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.webhook.port, 8181);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            load_config("/nonexistent/autocd.kdl"),
            Err(ConfigError::Io(_))
        ));
    }
}
