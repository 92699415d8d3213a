use anyhow::Context;
use nosql_demo_core::{ConnectionSettings, SettingsSources};
use std::path::PathBuf;

/// The process environment, skipping variables whose name or value is not
/// valid UTF-8.
pub fn utf8_env_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

/// Load the layered configuration once and bind the `Connection` section.
///
/// Missing keys are only warned about here; the demo reports them when it
/// reaches the step that needs them.
pub fn load_settings<I, K, V>(
    content_root: PathBuf,
    environment: &str,
    env_vars: I,
) -> anyhow::Result<ConnectionSettings>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let sources = SettingsSources::new(content_root, environment);
    let config = sources.load(env_vars).with_context(|| {
        format!(
            "failed to load configuration from {}",
            sources.content_root.display()
        )
    })?;
    tracing::debug!(
        environment,
        keys = config.len(),
        "configuration loaded"
    );

    let settings = ConnectionSettings::bind(&config);
    for key in settings.missing_keys() {
        tracing::warn!(key, "configuration setting is missing; the demo will fail when it needs it");
    }
    Ok(settings)
}
