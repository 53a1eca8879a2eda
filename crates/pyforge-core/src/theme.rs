//! Theme resolution.
//!
//! A theme is a palette mode plus the merged palette template. The merge
//! chain mirrors the original styling stack: stylekit base, stylekit
//! per-mode overrides, user base overrides, user per-mode overrides —
//! later sources win, merged deep. Both mode variants are computed once
//! at startup and swapped by reference afterwards, never mutated.

use serde_json::{json, Value};

use crate::config::ThemeOverrides;

// ── Mode ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Parse a stored or wire mode value; anything unrecognized is light.
    pub fn from_str_or_light(value: &str) -> Self {
        if value == "dark" {
            Self::Dark
        } else {
            Self::Light
        }
    }
}

// ── Theme ────────────────────────────────────────────────────────────

/// One resolved theme variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub mode: ThemeMode,
    /// Merged palette/template tree, opaque to the core.
    pub palette: Value,
}

/// Both variants, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct ThemeSet {
    light: Theme,
    dark: Theme,
}

impl ThemeSet {
    /// Build both variants from the configured overrides.
    ///
    /// Override strings that fail to parse as JSON are logged and treated
    /// as absent — a bad template never fails startup.
    pub fn from_config(stylekit: bool, overrides: &ThemeOverrides) -> Self {
        Self {
            light: build_theme(ThemeMode::Light, stylekit, overrides),
            dark: build_theme(ThemeMode::Dark, stylekit, overrides),
        }
    }

    pub fn get(&self, mode: ThemeMode) -> &Theme {
        match mode {
            ThemeMode::Light => &self.light,
            ThemeMode::Dark => &self.dark,
        }
    }
}

fn build_theme(mode: ThemeMode, stylekit: bool, overrides: &ThemeOverrides) -> Theme {
    let mut palette = if stylekit {
        stylekit_base()
    } else {
        json!({})
    };
    if stylekit {
        merge_json(&mut palette, &stylekit_mode(mode));
    }
    for (label, source) in [
        ("base", &overrides.base),
        (mode.as_str(), overrides.for_mode(mode)),
    ] {
        if let Some(value) = parse_override(label, source.as_deref()) {
            merge_json(&mut palette, &value);
        }
    }
    merge_json(&mut palette, &json!({"palette": {"mode": mode.as_str()}}));
    Theme { mode, palette }
}

fn parse_override(label: &str, source: Option<&str>) -> Option<Value> {
    let text = source?;
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            // Degrade to "no override" rather than failing the dispatch.
            tracing::warn!(theme = label, error = %e, "ignoring malformed theme template");
            None
        }
    }
}

// ── Deep merge ───────────────────────────────────────────────────────

/// Deep-merge `source` into `target`: objects merge key-wise, everything
/// else (arrays included) is replaced by the source value.
pub fn merge_json(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (key, value) in s {
                merge_json(t.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (t, s) => *t = s.clone(),
    }
}

// ── Stylekit defaults ────────────────────────────────────────────────

fn stylekit_base() -> Value {
    json!({
        "typography": { "fontFamily": "Lato, Arial, sans-serif" },
        "shape": { "borderRadius": 8 },
        "palette": {
            "primary": { "main": "#ff462b" },
            "secondary": { "main": "#283282" }
        }
    })
}

fn stylekit_mode(mode: ThemeMode) -> Value {
    match mode {
        ThemeMode::Light => json!({
            "palette": {
                "background": { "default": "#f0f5f7", "paper": "#ffffff" },
                "text": { "primary": "#14161a" }
            }
        }),
        ThemeMode::Dark => json!({
            "palette": {
                "background": { "default": "#14161a", "paper": "#1f2226" },
                "text": { "primary": "#f0f5f7" }
            }
        }),
    }
}

impl Default for ThemeSet {
    fn default() -> Self {
        Self::from_config(true, &ThemeOverrides::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
