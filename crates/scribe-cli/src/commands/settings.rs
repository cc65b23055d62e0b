use anyhow::Result;
use scribe_infrastructure::SettingsService;
use serde_json::Value;

pub fn get(settings: &SettingsService, key: Option<&str>) -> Result<()> {
    let value = match key {
        Some(key) => settings.get_key(key)?,
        None => serde_json::to_value(settings.get())?,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn set(settings: &SettingsService, key: &str, raw: &str) -> Result<()> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    settings.set_key(key, value)?;
    println!("{key} updated");
    Ok(())
}
