pub mod aggregate;
pub mod clustering;
pub mod distributions;
pub mod divergence;
pub mod keys;
pub mod models;
pub mod rng;
pub mod scaling;
pub mod state;

use std::fmt::Display;
use std::str::FromStr;

/// Deserialize an option name through its `FromStr` impl, so serde input
/// accepts the same spellings and reports the same errors as the CLI.
pub(crate) fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let name = <String as serde::Deserialize>::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}
