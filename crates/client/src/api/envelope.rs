//! Wire shapes and their normalization into `bazaar_core` types.
//!
//! The backend has shipped several response shapes over time: bare arrays,
//! `{data}` wrappers, Laravel paginators, and an `{items, page, totalPages}`
//! variant. Each is accepted here and folded into one canonical type, so
//! nothing above this module sees envelope variance.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use bazaar_core::{Category, Page, PageMeta, Price, Product, Seller, User};

use crate::error::ApiError;

/// Shown when a listing has no image at all.
pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/200";

/// Decode a JSON value, reporting failures as `MalformedResponse`.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::MalformedResponse(format!("unexpected {what} payload: {e}")))
}

// =============================================================================
// Lenient field helpers
// =============================================================================

/// Ids arrive as numbers or strings; both become strings.
fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid id: {other}"))),
    }
}

/// User ids must be integers, possibly quoted.
fn flexible_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("invalid user id: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid user id: {s:?}"))),
        other => Err(D::Error::custom(format!("invalid user id: {other}"))),
    }
}

/// Nested objects the backend may omit, null out, or shape unexpectedly.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Interpret booleans the way PHP backends send them.
pub(crate) fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    #[serde(deserialize_with = "flexible_i64")]
    id: i64,
    email: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<WireUser> for User {
    fn from(wire: WireUser) -> Self {
        let username = wire
            .username
            .or(wire.name)
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| wire.email.split('@').next().unwrap_or_default().to_string());
        Self::new(wire.id, wire.email, username)
    }
}

/// Credentials payload returned by login and register.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthPayload {
    #[serde(default, alias = "token")]
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AuthEnvelope {
    Wrapped { data: AuthPayload },
    Bare(AuthPayload),
}

impl AuthEnvelope {
    pub(crate) fn into_payload(self) -> AuthPayload {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct WireCategory {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<WireCategory> for Category {
    fn from(wire: WireCategory) -> Self {
        Self {
            id: wire.id.into(),
            name: wire.name,
            description: wire.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSeller {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<WireSeller> for Seller {
    fn from(wire: WireSeller) -> Self {
        let id = wire.id.and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        Self {
            id: id.map(Into::into),
            username: wire.username.or(wire.name),
        }
    }
}

/// Images are URL strings or `{url}` / `{path}` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireImage {
    Url(String),
    Object {
        #[serde(alias = "path", alias = "src")]
        url: String,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProduct {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    images: Option<Vec<WireImage>>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default, alias = "isFavorite")]
    is_favorite: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    category: Option<WireCategory>,
    #[serde(default, deserialize_with = "lenient")]
    user: Option<WireSeller>,
    #[serde(default, deserialize_with = "lenient")]
    created_at: Option<String>,
}

impl From<WireProduct> for Product {
    fn from(wire: WireProduct) -> Self {
        let images: Vec<String> = wire
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|image| match image {
                WireImage::Url(url) | WireImage::Object { url } => url,
            })
            .filter(|url| !url.trim().is_empty())
            .collect();

        let image_url = images
            .first()
            .cloned()
            .or(wire.image_url)
            .or(wire.image)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

        Self {
            id: wire.id.into(),
            title: wire.title.or(wire.name).unwrap_or_default(),
            description: wire.description.unwrap_or_default(),
            price: wire
                .price
                .as_ref()
                .and_then(Price::from_json)
                .unwrap_or(Price::ZERO),
            images,
            image_url,
            is_favorite: wire.is_favorite.as_ref().and_then(truthy).unwrap_or(false),
            category: wire.category.map(Into::into),
            user: wire.user.map(Into::into),
            created_at: wire.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

// =============================================================================
// Envelopes
// =============================================================================

/// A single item, bare or `{data}`-wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ItemEnvelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> ItemEnvelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// A list, bare or `{data}`-wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListEnvelope<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListEnvelope<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireMeta {
    #[serde(default)]
    current_page: Option<u32>,
    #[serde(default)]
    last_page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
    #[serde(default)]
    total: Option<u64>,
}

/// Every paginated shape the backend has produced.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PageEnvelope<T> {
    /// `{data, meta}` (API resources) or `{data, current_page, ...}`
    /// (plain paginator).
    Data {
        data: Vec<T>,
        #[serde(default)]
        meta: Option<WireMeta>,
        #[serde(flatten)]
        top: WireMeta,
    },
    /// `{items, page, totalPages, limit, total}`.
    Items {
        items: Vec<T>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default, rename = "totalPages", alias = "total_pages")]
        total_pages: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<T>),
}

impl<T> PageEnvelope<T> {
    /// Fold into a canonical page. `requested_page` fills in when the
    /// server does not echo it back.
    pub(crate) fn into_page<U: From<T>>(self, requested_page: Option<u32>) -> Page<U> {
        let (items, meta) = match self {
            Self::Data { data, meta, top } => {
                let meta = meta.unwrap_or(top);
                let page = requested_page.unwrap_or(1);
                let len = data.len();
                let meta = resolve_meta(
                    meta.current_page.or(Some(page)),
                    meta.last_page,
                    meta.per_page,
                    meta.total,
                    len,
                );
                (data, meta)
            }
            Self::Items {
                items,
                page,
                total_pages,
                limit,
                total,
            } => {
                let len = items.len();
                let meta = resolve_meta(
                    page.or(requested_page),
                    total_pages,
                    limit,
                    total,
                    len,
                );
                (items, meta)
            }
            Self::Bare(items) => {
                let meta = PageMeta::single(items.len());
                (items, meta)
            }
        };

        Page {
            data: items.into_iter().map(U::from).collect(),
            meta,
        }
    }
}

fn resolve_meta(
    current_page: Option<u32>,
    last_page: Option<u32>,
    per_page: Option<u32>,
    total: Option<u64>,
    len: usize,
) -> PageMeta {
    let len32 = u32::try_from(len).unwrap_or(u32::MAX);
    let current_page = current_page.unwrap_or(1).max(1);
    PageMeta {
        current_page,
        last_page: last_page.unwrap_or(current_page).max(current_page),
        per_page: per_page.unwrap_or(len32),
        total: total.unwrap_or_else(|| u64::try_from(len).unwrap_or(u64::MAX)),
    }
}
