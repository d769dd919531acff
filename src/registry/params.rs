//! Hyperparameter maps and typed accessors

use crate::error::{Result, RunboardError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name -> JSON value mapping of hyperparameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparams(Map<String, Value>);

impl Hyperparams {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Shallow merge: keys in `overrides` replace keys in `self`
    pub fn merged_with(&self, overrides: &Hyperparams) -> Hyperparams {
        let mut merged = self.0.clone();
        for (k, v) in &overrides.0 {
            merged.insert(k.clone(), v.clone());
        }
        Hyperparams(merged)
    }

    /// Reject keys outside `allowed`
    pub fn check_known(&self, model: &str, allowed: &[&str]) -> Result<()> {
        if let Some(key) = self.0.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(RunboardError::InvalidParameter {
                name: key.clone(),
                value: self.0[key].to_string(),
                reason: format!("not a {} parameter", model),
            });
        }
        Ok(())
    }

    /// Present, non-null value
    fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    fn wrong_type(&self, key: &str, expected: &str) -> RunboardError {
        let shown = self.0.get(key).map(Value::to_string).unwrap_or_default();
        RunboardError::invalid_param(key, shown, format!("expected {}", expected))
    }

    /// Non-negative integer; integral floats such as `100.0` are accepted
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        let Some(v) = self.value(key) else { return Ok(None) };
        if let Some(n) = v.as_u64() {
            return Ok(Some(n as usize));
        }
        match v.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as usize)),
            _ => Err(self.wrong_type(key, "a non-negative integer")),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.get_usize(key)?.map(|n| n as u64))
    }

    pub fn get_i32(&self, key: &str) -> Result<Option<i32>> {
        let Some(v) = self.value(key) else { return Ok(None) };
        v.as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| self.wrong_type(key, "an integer"))
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        let Some(v) = self.value(key) else { return Ok(None) };
        v.as_f64()
            .map(Some)
            .ok_or_else(|| self.wrong_type(key, "a number"))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(v) = self.value(key) else { return Ok(None) };
        v.as_bool()
            .map(Some)
            .ok_or_else(|| self.wrong_type(key, "a boolean"))
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        let Some(v) = self.value(key) else { return Ok(None) };
        v.as_str()
            .map(Some)
            .ok_or_else(|| self.wrong_type(key, "a string"))
    }

    /// List of positive integers; a bare integer is a one-element list
    pub fn get_usize_list(&self, key: &str) -> Result<Option<Vec<usize>>> {
        let Some(v) = self.value(key) else { return Ok(None) };
        match v {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .map(|n| n as usize)
                        .ok_or_else(|| self.wrong_type(key, "a list of integers"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Value::Number(_) => self.get_usize(key).map(|n| n.map(|n| vec![n])),
            _ => Err(self.wrong_type(key, "a list of integers")),
        }
    }

    /// Raw value, for parameters accepting several JSON types
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.value(key)
    }
}

impl From<Map<String, Value>> for Hyperparams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_values_win_on_merge() {
        let defaults = Hyperparams::new().with("n_estimators", 100).with("max_depth", 10);
        let user = Hyperparams::new().with("n_estimators", 40);
        let merged = defaults.merged_with(&user);

        assert_eq!(merged.get_usize("n_estimators").unwrap(), Some(40));
        assert_eq!(merged.get_usize("max_depth").unwrap(), Some(10));
    }

    #[test]
    fn test_typed_getters() {
        let params: Hyperparams = serde_json::from_value(json!({
            "n": 5,
            "f": 5.0,
            "lr": 0.5,
            "on": true,
            "kind": "rbf",
            "layers": [64, 32],
            "gone": null
        }))
        .unwrap();

        assert_eq!(params.get_usize("n").unwrap(), Some(5));
        assert_eq!(params.get_usize("f").unwrap(), Some(5));
        assert_eq!(params.get_f64("lr").unwrap(), Some(0.5));
        assert_eq!(params.get_bool("on").unwrap(), Some(true));
        assert_eq!(params.get_str("kind").unwrap(), Some("rbf"));
        assert_eq!(params.get_usize_list("layers").unwrap(), Some(vec![64, 32]));
        assert_eq!(params.get_usize("gone").unwrap(), None);
        assert_eq!(params.get_usize("missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_invalid_parameter() {
        let params = Hyperparams::new().with("n_estimators", "many").with("lr", 0.5);
        assert!(matches!(
            params.get_usize("n_estimators"),
            Err(RunboardError::InvalidParameter { .. })
        ));
        assert!(params.get_usize("lr").is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let params = Hyperparams::new().with("n_estimators", 5).with("colour", "red");
        let err = params.check_known("RandomForest", &["n_estimators"]).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }
}
