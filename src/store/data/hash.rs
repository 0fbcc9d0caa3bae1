//! Field/value hash used for counters (`HINCRBY` / `HGETALL`)

use ahash::AHashMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HashValue {
    fields: AHashMap<String, String>,
}

impl HashValue {
    pub fn new() -> Self {
        HashValue {
            fields: AHashMap::new(),
        }
    }

    pub fn set(&mut self, field: &str, value: String) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// HINCRBY: missing fields start at 0. Fails if the current value is
    /// not an integer or the result would overflow.
    pub fn incr_by(&mut self, field: &str, delta: i64) -> Result<i64, String> {
        let current = match self.fields.get(field) {
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| "ERR hash value is not an integer".to_string())?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| "ERR increment or decrement would overflow".to_string())?;
        self.fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
