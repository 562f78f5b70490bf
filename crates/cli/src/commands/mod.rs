pub mod allocate;
pub mod catalog;
pub mod config;
pub mod invoice;

use std::path::PathBuf;

use packfill_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use packfill_core::cpq::catalog::Catalog;
use packfill_core::errors::{ApplicationError, InterfaceError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;

use crate::logging;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_interface(command: &str, error: &InterfaceError) -> Self {
        let exit_code = match error {
            InterfaceError::Internal { .. } => 2,
            InterfaceError::ServiceUnavailable { .. } => 3,
            InterfaceError::BadRequest { .. } => 4,
        };
        Self::failure(command, error.error_class(), error.message(), exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Flags shared by the commands that read a catalog and draw random numbers.
#[derive(Debug, Clone, Default)]
pub struct RuntimeArgs {
    pub config_file: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub seed: Option<u64>,
}

/// Loaded state for one command invocation.
pub(crate) struct Runtime {
    pub config: AppConfig,
    pub catalog: Catalog,
    pub seed: u64,
}

impl Runtime {
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    pub fn correlation_id(&self, command: &str) -> String {
        format!("{command}-{}", self.seed)
    }
}

pub(crate) fn load_config(args: &RuntimeArgs) -> Result<AppConfig, ApplicationError> {
    let config = AppConfig::load(LoadOptions {
        config_path: args.config_file.clone(),
        require_file: args.config_file.is_some(),
        overrides: ConfigOverrides {
            catalog_path: args.catalog.clone(),
            random_seed: args.seed,
            ..ConfigOverrides::default()
        },
    })?;
    logging::init(&config);
    Ok(config)
}

/// Loads configuration and the catalog it points at, and fixes the seed for
/// this run. A run without a configured seed draws one so it can be replayed.
pub(crate) fn prepare(args: &RuntimeArgs) -> Result<Runtime, ApplicationError> {
    let config = load_config(args)?;
    let catalog = Catalog::from_path(&config.catalog.path)?;
    let seed = config.random.seed.unwrap_or_else(rand::random);

    Ok(Runtime { config, catalog, seed })
}

/// Exit code for a report that could not be encoded as JSON.
pub(crate) const SERIALIZATION_EXIT_CODE: u8 = 5;

/// Wraps a report as the `data` field of a successful payload. A report that
/// fails to encode turns the whole command into a `serialization` failure.
pub(crate) fn success_with_report(
    command: &str,
    message: impl Into<String>,
    report: &impl Serialize,
) -> CommandResult {
    match serde_json::to_value(report) {
        Ok(data) => CommandResult::success_with_data(command, message, Some(data)),
        Err(error) => CommandResult::failure(
            command,
            "serialization",
            format!("could not encode {command} report: {error}"),
            SERIALIZATION_EXIT_CODE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Value;

    use super::{success_with_report, CommandResult, SERIALIZATION_EXIT_CODE};

    fn payload(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("payload is json")
    }

    #[test]
    fn report_is_attached_as_data() {
        let report = BTreeMap::from([("total", "480.00")]);
        let result = success_with_report("allocate", "allocated", &report);

        assert_eq!(result.exit_code, 0);
        let payload = payload(&result);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["total"], "480.00");
    }

    #[test]
    fn unencodable_report_fails_the_command() {
        let report = BTreeMap::from([(vec![1_u8, 2], "not a string key")]);
        let result = success_with_report("allocate", "allocated", &report);

        assert_eq!(result.exit_code, SERIALIZATION_EXIT_CODE);
        let payload = payload(&result);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "serialization");
        assert!(payload.get("data").is_none());
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.starts_with("could not encode allocate report")));
    }
}
