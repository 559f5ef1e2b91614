use crate::error::{EcoError, Result};
use crate::models::classroom::{ClassroomLimits, ACTION_COOLDOWN_MS, MAX_DAILY_POINTS, MAX_NOTIFICATIONS};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 2;
const DEFAULT_FAST_FIX_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub limits: ClassroomLimits,
    pub fast_fix_window_ms: i64,
    pub disabled_patterns: Vec<String>,
    pub classroom_enabled: bool,
    /// Offset from UTC used to decide what counts as night for the user.
    pub utc_offset_minutes: i32,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        settings_from_value(&default_settings())
    }
}

pub fn load_effective_settings(workspace_path: &str) -> Result<EffectiveSettings> {
    let settings = load_settings_from_disk(workspace_path)?;
    Ok(settings_from_value(&settings))
}

fn settings_from_value(settings: &Value) -> EffectiveSettings {
    let limits = ClassroomLimits {
        max_daily_points: settings
            .get("maxDailyPoints")
            .and_then(Value::as_u64)
            .unwrap_or(MAX_DAILY_POINTS),
        action_cooldown_ms: settings
            .get("actionCooldownMs")
            .and_then(Value::as_i64)
            .unwrap_or(ACTION_COOLDOWN_MS),
        max_notifications: settings
            .get("maxNotifications")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(MAX_NOTIFICATIONS),
    };

    let disabled_patterns = settings
        .get("disabledPatterns")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    EffectiveSettings {
        limits,
        fast_fix_window_ms: settings
            .get("fastFixWindowMs")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_FAST_FIX_WINDOW_MS as i64),
        disabled_patterns,
        classroom_enabled: settings
            .get("classroomEnabled")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        utc_offset_minutes: settings
            .get("utcOffsetMinutes")
            .and_then(Value::as_i64)
            .and_then(|minutes| i32::try_from(minutes).ok())
            .unwrap_or(0),
    }
}

pub fn load_settings_from_disk(workspace_path: &str) -> Result<Value> {
    let path = settings_path(workspace_path);
    ensure_settings_dir(workspace_path)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| EcoError::Config(format!("Failed to read settings.json: {e}")))?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|_| json!({}))
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(workspace_path: &str, settings: Value) -> Result<Value> {
    let path = settings_path(workspace_path);
    ensure_settings_dir(workspace_path)?;

    let mut merged = load_settings_from_disk(workspace_path).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    Ok(migrated)
}

fn settings_path(workspace_path: &str) -> PathBuf {
    Path::new(workspace_path).join(".ecolens").join("settings.json")
}

fn ensure_settings_dir(workspace_path: &str) -> Result<()> {
    let dir = Path::new(workspace_path).join(".ecolens");
    fs::create_dir_all(&dir)
        .map_err(|e| EcoError::Config(format!("Failed to create .ecolens directory: {e}")))
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<()> {
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| EcoError::Config(format!("Failed to serialize settings: {e}")))?;
    fs::write(path, raw).map_err(|e| EcoError::Config(format!("Failed to write settings.json: {e}")))
}

fn migrate_settings(input: Value) -> Value {
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if version < 2 {
        // V1 used the "XP" vocabulary for classroom limits.
        rename_key(&mut out, "dailyXpLimit", "maxDailyPoints");
        rename_key(&mut out, "actionCooldown", "actionCooldownMs");
    }

    deep_merge_defaults(&mut out, &default_settings());
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "maxDailyPoints": MAX_DAILY_POINTS,
        "actionCooldownMs": ACTION_COOLDOWN_MS,
        "maxNotifications": MAX_NOTIFICATIONS,
        "fastFixWindowMs": DEFAULT_FAST_FIX_WINDOW_MS,
        "disabledPatterns": [],
        "classroomEnabled": true,
        "utcOffsetMinutes": 0
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn rename_key(settings: &mut Value, from: &str, to: &str) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };
    if let Some(value) = obj.remove(from) {
        obj.entry(to.to_string()).or_insert(value);
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_u64(obj, "maxDailyPoints", 50, 5_000, MAX_DAILY_POINTS);
    clamp_u64(obj, "actionCooldownMs", 0, 3_600_000, ACTION_COOLDOWN_MS as u64);
    clamp_u64(obj, "maxNotifications", 10, 500, MAX_NOTIFICATIONS as u64);
    clamp_u64(obj, "fastFixWindowMs", 1_000, 600_000, DEFAULT_FAST_FIX_WINDOW_MS);
    clamp_i64(obj, "utcOffsetMinutes", -720, 840, 0);

    ensure_bool(obj, "classroomEnabled", true);
    sanitize_string_list(obj, "disabledPatterns");
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn clamp_i64(map: &mut Map<String, Value>, key: &str, min: i64, max: i64, default: i64) {
    let raw = map.get(key).and_then(Value::as_i64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn ensure_bool(map: &mut Map<String, Value>, key: &str, default: bool) {
    let value = map.get(key).and_then(Value::as_bool).unwrap_or(default);
    map.insert(key.to_string(), json!(value));
}

fn sanitize_string_list(map: &mut Map<String, Value>, key: &str) {
    let mut items: Vec<String> = map
        .get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    items.sort();
    items.dedup();
    map.insert(key.to_string(), json!(items));
}
