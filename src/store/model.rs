use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// top-level keys of database.json
pub const KEY_SEARCH_HISTORY: &str = "search-history";
pub const KEY_VISIT_HISTORY: &str = "visit-history";
pub const KEY_BOOKMARK: &str = "bookmark";
pub const KEY_SETTINGS: &str = "settings";

/// Root of the persisted state. Every key defaults when absent so a partial
/// file still loads, and an unreadable entry costs only itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "search-history", default, deserialize_with = "lenient_entries")]
    pub search_history: Vec<SearchHistoryEntry>,
    #[serde(rename = "visit-history", default, deserialize_with = "lenient_entries")]
    pub visit_history: Vec<VisitHistoryEntry>,
    #[serde(rename = "bookmark", default, deserialize_with = "lenient_entries")]
    pub bookmark: Vec<BookmarkEntry>,
    #[serde(default, deserialize_with = "lenient_settings")]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub text: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitHistoryEntry {
    pub id: String,
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: i64,
    /// 64-hex favicon asset id, see `store::favicon`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    // fields the UI adds that we don't interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub id: String,
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Replaced wholesale by `data/settings/set`; unknown keys pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// The UI writes plain JS values: `null` titles, float timestamps, and the
// occasional half-built entry. Decode what can be decoded and drop the rest.

fn lenient_entries<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(de)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!(kind = std::any::type_name::<T>(), found = %json_kind(&other), "collection is not an array, ignored");
            return Ok(Vec::new());
        }
    };
    let total = items.len();
    let entries: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match serde_json::from_value(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(kind = std::any::type_name::<T>(), index, error = %e, "dropping unreadable entry");
                None
            }
        })
        .collect();
    if entries.len() < total {
        tracing::warn!(kind = std::any::type_name::<T>(), kept = entries.len(), total, "collection loaded partially");
    }
    Ok(entries)
}

// typed fields that don't fit are demoted to `extra` rather than lost
fn lenient_settings<'de, D: Deserializer<'de>>(de: D) -> Result<Settings, D::Error> {
    match Value::deserialize(de)? {
        Value::Object(map) => match serde_json::from_value(Value::Object(map.clone())) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!(error = %e, "settings kept untyped");
                Ok(Settings { extra: map, ..Settings::default() })
            }
        },
        Value::Null => Ok(Settings::default()),
        other => {
            tracing::warn!(found = %json_kind(&other), "settings is not an object, ignored");
            Ok(Settings::default())
        }
    }
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

fn lenient_millis<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range")),
        Some(Value::String(s)) => s.trim().parse().map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!("timestamp is {}", json_kind(&other)))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Entries addressable by their caller-supplied id.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for VisitHistoryEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for BookmarkEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl VisitHistoryEntry {
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            timestamp,
            favicon: None,
            extra: Map::new(),
        }
    }
}

impl BookmarkEntry {
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            timestamp,
            favicon: None,
            extra: Map::new(),
        }
    }
}
