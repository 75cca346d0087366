//! Running a vehicle application against the local runtime.
//!
//! The application is told where the runtime services listen through the
//! `SDV_*` middleware variables, built from the `port` entries of the
//! catalog. It runs in the foreground with the terminal attached.

use crate::catalog::ServiceCatalog;
use crate::error::{Error, Result};
use crate::service::LaunchCommand;
use std::collections::BTreeMap;

pub const VEHICLEDATABROKER_ID: &str = "vehicledatabroker";
pub const MQTT_BROKER_ID: &str = "mqtt-broker";

const LOCALHOST: &str = "127.0.0.1";

/// Middleware variables pointing an application at the catalog's data
/// broker and MQTT broker.
pub fn middleware_env(catalog: &dyn ServiceCatalog) -> Result<BTreeMap<String, String>> {
    let vdb_port = service_port(catalog, VEHICLEDATABROKER_ID)?;
    let mqtt_port = service_port(catalog, MQTT_BROKER_ID)?;

    let mut env = BTreeMap::new();
    env.insert("SDV_MIDDLEWARE_TYPE".to_string(), "native".to_string());
    env.insert(
        "SDV_VEHICLEDATABROKER_ADDRESS".to_string(),
        format!("grpc://{}:{}", LOCALHOST, vdb_port),
    );
    env.insert(
        "SDV_MQTT_ADDRESS".to_string(),
        format!("mqtt://{}:{}", LOCALHOST, mqtt_port),
    );
    Ok(env)
}

fn service_port(catalog: &dyn ServiceCatalog, id: &str) -> Result<String> {
    catalog.get(id)?.port.ok_or_else(|| {
        Error::Catalog(format!("Service '{}' does not define a 'port' entry", id))
    })
}

/// Apply `NAME=VALUE` overrides on top of `env`. Later entries win.
pub fn apply_env_overrides(env: &mut BTreeMap<String, String>, overrides: &[String]) -> Result<()> {
    for entry in overrides {
        let (name, value) = entry.split_once('=').ok_or_else(|| {
            Error::Config(format!(
                "Invalid environment override '{}' (expected NAME=VALUE)",
                entry
            ))
        })?;
        if name.is_empty() {
            return Err(Error::Config(format!(
                "Invalid environment override '{}' (empty name)",
                entry
            )));
        }
        env.insert(name.to_string(), value.to_string());
    }
    Ok(())
}

/// Command line for `executable` with the middleware variables and overrides set.
pub fn app_command(
    catalog: &dyn ServiceCatalog,
    executable: &str,
    args: &[String],
    overrides: &[String],
) -> Result<LaunchCommand> {
    let mut env = middleware_env(catalog)?;
    apply_env_overrides(&mut env, overrides)?;

    let mut cmd = LaunchCommand::new(executable).args(args.iter().cloned());
    for (name, value) in env {
        cmd = cmd.env(name, value);
    }
    Ok(cmd)
}

/// Run `command` in the foreground with inherited stdio and wait for it.
///
/// A non-zero exit is [`Error::AppFailed`] carrying the application's code.
pub async fn run_app(command: &LaunchCommand) -> Result<()> {
    tracing::debug!("Running application: {}", command.render());

    let status = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| Error::Launch {
            service: command.program.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::AppFailed {
            executable: command.program.clone(),
            exit_code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ServiceDescriptor, StaticCatalog};

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            ServiceDescriptor::new(MQTT_BROKER_ID, "eclipse-mosquitto:2.0.14").port("1883"),
            ServiceDescriptor::new(VEHICLEDATABROKER_ID, "databroker:0.4").port("55555"),
        ])
        .unwrap()
    }

    #[test]
    fn test_middleware_env_uses_catalog_ports() {
        let env = middleware_env(&catalog()).unwrap();
        assert_eq!(env["SDV_MIDDLEWARE_TYPE"], "native");
        assert_eq!(env["SDV_VEHICLEDATABROKER_ADDRESS"], "grpc://127.0.0.1:55555");
        assert_eq!(env["SDV_MQTT_ADDRESS"], "mqtt://127.0.0.1:1883");
    }

    #[test]
    fn test_missing_broker_or_port_is_reported() {
        let no_broker = StaticCatalog::new(vec![
            ServiceDescriptor::new(VEHICLEDATABROKER_ID, "databroker:0.4").port("55555"),
        ])
        .unwrap();
        assert!(matches!(
            middleware_env(&no_broker),
            Err(Error::ServiceNotFound { service, .. }) if service == MQTT_BROKER_ID
        ));

        let no_port = StaticCatalog::new(vec![
            ServiceDescriptor::new(MQTT_BROKER_ID, "eclipse-mosquitto:2.0.14").port("1883"),
            ServiceDescriptor::new(VEHICLEDATABROKER_ID, "databroker:0.4"),
        ])
        .unwrap();
        let err = middleware_env(&no_port).unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
        assert!(err.to_string().contains("vehicledatabroker"));
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut env = middleware_env(&catalog()).unwrap();
        apply_env_overrides(
            &mut env,
            &[
                "SDV_MQTT_ADDRESS=mqtt://10.0.0.2:1883".to_string(),
                "APP_TOKEN=a=b".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(env["SDV_MQTT_ADDRESS"], "mqtt://10.0.0.2:1883");
        assert_eq!(env["APP_TOKEN"], "a=b");

        assert!(matches!(
            apply_env_overrides(&mut env, &["NO_VALUE".to_string()]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            apply_env_overrides(&mut env, &["=value".to_string()]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_app_command_carries_args_and_env() {
        let cmd = app_command(
            &catalog(),
            "./app",
            &["--verbose".to_string()],
            &["LOG=debug".to_string()],
        )
        .unwrap();
        assert_eq!(cmd.program, "./app");
        assert_eq!(cmd.args, vec!["--verbose"]);
        assert!(cmd.env.contains(&("LOG".to_string(), "debug".to_string())));
        assert!(cmd
            .env
            .contains(&("SDV_MIDDLEWARE_TYPE".to_string(), "native".to_string())));
    }

    #[tokio::test]
    async fn test_run_app_reports_exit_code() {
        let ok = LaunchCommand::new("sh").args(["-c", "test \"$SDV_MIDDLEWARE_TYPE\" = native"]);
        let ok = ok.env("SDV_MIDDLEWARE_TYPE", "native");
        assert!(run_app(&ok).await.is_ok());

        let failing = LaunchCommand::new("sh").args(["-c", "exit 3"]);
        assert!(matches!(
            run_app(&failing).await,
            Err(Error::AppFailed { exit_code: Some(3), .. })
        ));
    }

    #[tokio::test]
    async fn test_run_app_missing_executable() {
        let missing = LaunchCommand::new("/definitely/not/an/app");
        assert!(matches!(run_app(&missing).await, Err(Error::Launch { .. })));
    }
}
