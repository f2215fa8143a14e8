//! Command-line interface: run the display, inspect backend resources, or
//! perform admin operations from a terminal on the device.

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use super::api_client::ApiClient;
use super::config::DEFAULT_CONFIG_PATH;
use super::errors::{ApiError, AppError};
use super::fetcher::{DataFetcher, QueryState, RefreshPolicy};
use super::model::AdminSettings;

#[derive(Parser, Debug)]
#[command(name = "signage_display", version, about = "Full-screen digital signage display client")]
pub struct Cli {
    /// Path to the INI configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the display (default).
    Run,
    /// Fetch one resource from the backend and print it as JSON.
    Inspect {
        #[arg(value_enum)]
        resource: Resource,
        /// Keep polling with the resource's refresh policy and print every update.
        #[arg(long)]
        watch: bool,
    },
    /// Admin operations. Opens a session, runs the action, then logs out.
    Admin {
        #[arg(long)]
        password: String,
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Display,
    Weather,
    Birthdays,
    Media,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum AdminAction {
    /// Print the current admin settings.
    Settings,
    /// Change the weather location, and optionally the API key.
    SetWeather {
        #[arg(long)]
        location: String,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List news items.
    News,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(value).map_err(ApiError::from)?)
}

impl Resource {
    fn name(self) -> &'static str {
        match self {
            Resource::Display => "display",
            Resource::Weather => "weather",
            Resource::Birthdays => "birthdays",
            Resource::Media => "media",
        }
    }

    pub fn refresh_policy(self) -> RefreshPolicy {
        match self {
            Resource::Display => RefreshPolicy::display(),
            Resource::Weather => RefreshPolicy::weather(),
            Resource::Birthdays => RefreshPolicy::birthdays(),
            Resource::Media => RefreshPolicy::media(),
        }
    }
}

async fn fetch_resource(client: &ApiClient, resource: Resource) -> Result<Value, ApiError> {
    let value = match resource {
        Resource::Display => serde_json::to_value(client.display_data().await?)?,
        Resource::Weather => serde_json::to_value(client.weather().await?)?,
        Resource::Birthdays => serde_json::to_value(client.birthdays().await?)?,
        Resource::Media => serde_json::to_value(client.media().await?)?,
    };
    Ok(value)
}

pub async fn inspect(client: &ApiClient, resource: Resource) -> Result<String, AppError> {
    info!("Inspecting {} from {}", resource.name(), client.base_url());
    to_json(&fetch_resource(client, resource).await?)
}

/// Polls `resource` until interrupted, printing each published state.
pub async fn watch(client: ApiClient, resource: Resource) -> Result<(), AppError> {
    let policy = resource.refresh_policy();
    info!("Watching {} every {:?} ({:?} after errors).", resource.name(), policy.interval, policy.error_interval);
    let (fetcher, mut state_rx) = DataFetcher::new(resource.name(), policy, QueryState::<Value>::default());
    let fetch = move || {
        let client = client.clone();
        async move { fetch_resource(&client, resource).await }
    };
    tokio::spawn(fetcher.run(fetch, None, |_: &Value| {}));

    while state_rx.changed().await.is_ok() {
        let state = state_rx.borrow_and_update().clone();
        match (&state.error, &state.data) {
            (Some(e), _) => eprintln!("[{}] {} (attempts: {})", resource.name(), e, state.failure_count),
            (None, Some(data)) => println!("{}", to_json(data)?),
            (None, None) => {}
        }
    }
    Ok(())
}

/// Applies a `set-weather` request on top of the current settings.
pub fn apply_weather_update(mut settings: AdminSettings, location: &str, api_key: Option<&str>) -> AdminSettings {
    settings.weather.location = location.to_string();
    if let Some(key) = api_key {
        settings.weather.api_key = key.to_string();
    }
    settings
}

pub async fn admin(client: &ApiClient, password: &str, action: &AdminAction) -> Result<String, AppError> {
    client.login(password).await?;
    let result = run_admin_action(client, action).await;
    if let Err(e) = client.logout().await {
        warn!("Logout after admin command failed: {}", e);
    }
    result
}

async fn run_admin_action(client: &ApiClient, action: &AdminAction) -> Result<String, AppError> {
    match action {
        AdminAction::Settings => to_json(&client.admin_settings().await?),
        AdminAction::SetWeather { location, api_key } => {
            let current = client.admin_settings().await?;
            let updated = apply_weather_update(current, location, api_key.as_deref());
            to_json(&client.update_admin_settings(&updated).await?)
        }
        AdminAction::News => to_json(&client.admin_news().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherSettings;

    #[test]
    fn test_no_subcommand_defaults_to_run_with_default_config() {
        let cli = Cli::try_parse_from(["signage_display"]).unwrap();
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_inspect_parses_resource() {
        let cli = Cli::try_parse_from(["signage_display", "-c", "/tmp/x.conf", "inspect", "birthdays"]).unwrap();
        assert_eq!(cli.config, "/tmp/x.conf");
        assert_eq!(cli.command, Some(Command::Inspect { resource: Resource::Birthdays, watch: false }));

        let cli = Cli::try_parse_from(["signage_display", "inspect", "weather", "--watch"]).unwrap();
        assert_eq!(cli.command, Some(Command::Inspect { resource: Resource::Weather, watch: true }));
        assert!(Cli::try_parse_from(["signage_display", "inspect", "news"]).is_err());
    }

    #[test]
    fn test_admin_set_weather_parses() {
        let cli = Cli::try_parse_from([
            "signage_display", "admin", "--password", "pw", "set-weather", "--location", "Recife,BR",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Admin {
                password: "pw".into(),
                action: AdminAction::SetWeather { location: "Recife,BR".into(), api_key: None },
            })
        );
        assert!(Cli::try_parse_from(["signage_display", "admin", "news"]).is_err());
    }

    #[test]
    fn test_each_resource_polls_with_its_own_policy() {
        assert_eq!(Resource::Display.refresh_policy(), RefreshPolicy::display());
        assert_eq!(Resource::Weather.refresh_policy().interval, std::time::Duration::from_secs(300));
        assert_eq!(Resource::Birthdays.refresh_policy().interval, std::time::Duration::from_secs(3600));
        assert_eq!(Resource::Media.refresh_policy().interval, std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_weather_update_keeps_key_unless_given() {
        let current = AdminSettings {
            weather: WeatherSettings { api_key: "old".into(), location: "Natal,BR".into() },
        };
        let kept = apply_weather_update(current.clone(), "Recife,BR", None);
        assert_eq!(kept.weather.api_key, "old");
        assert_eq!(kept.weather.location, "Recife,BR");

        let replaced = apply_weather_update(current, "Recife,BR", Some("new"));
        assert_eq!(replaced.weather.api_key, "new");
    }
}
