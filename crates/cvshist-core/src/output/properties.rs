//! File properties attached to added files.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::ConversionOptions;
use crate::domain::{ConvertError, Result};

pub const MIME_TYPE: &str = "svn:mime-type";
pub const KEYWORDS: &str = "svn:keywords";
const BINARY_MIME_TYPE: &str = "application/octet-stream";
const KEYWORD_LIST: &str = "Author Date Id Revision";

pub trait PropertySetter: Send + Sync {
    fn set_properties(
        &self,
        path: &str,
        keyword_mode: Option<&str>,
        properties: &mut BTreeMap<String, String>,
    );
}

/// Maps the RCS keyword-substitution mode to properties.
///
/// `b` marks the file binary; `kv`, `kvl` and the default mode enable
/// keyword expansion; other modes (`k`, `o`, `v`) set nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordModeSetter;

impl PropertySetter for KeywordModeSetter {
    fn set_properties(
        &self,
        _path: &str,
        keyword_mode: Option<&str>,
        properties: &mut BTreeMap<String, String>,
    ) {
        match keyword_mode {
            Some("b") => {
                properties.insert(MIME_TYPE.to_string(), BINARY_MIME_TYPE.to_string());
            }
            None | Some("kv") | Some("kvl") => {
                properties.insert(KEYWORDS.to_string(), KEYWORD_LIST.to_string());
            }
            Some(_) => {}
        }
    }
}

/// Sets `name` to `value` on paths matching a regex. An empty value removes
/// the property.
#[derive(Debug, Clone)]
pub struct PathPatternSetter {
    pattern: Regex,
    name: String,
    value: String,
}

impl PathPatternSetter {
    pub fn new(pattern: &str, name: &str, value: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ConvertError::configuration(format!("invalid property pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

impl PropertySetter for PathPatternSetter {
    fn set_properties(
        &self,
        path: &str,
        _keyword_mode: Option<&str>,
        properties: &mut BTreeMap<String, String>,
    ) {
        if !self.pattern.is_match(path) {
            return;
        }
        if self.value.is_empty() {
            properties.remove(&self.name);
        } else {
            properties.insert(self.name.clone(), self.value.clone());
        }
    }
}

/// Setters applied in order; later setters override earlier ones.
#[derive(Default)]
pub struct PropertyChain {
    setters: Vec<Box<dyn PropertySetter>>,
}

impl PropertyChain {
    pub fn from_options(options: &ConversionOptions) -> Result<Self> {
        let mut chain = Self::default();
        if options.keyword_properties {
            chain.push(Box::new(KeywordModeSetter));
        }
        for rule in &options.properties {
            chain.push(Box::new(PathPatternSetter::new(
                &rule.pattern,
                &rule.name,
                &rule.value,
            )?));
        }
        Ok(chain)
    }

    pub fn push(&mut self, setter: Box<dyn PropertySetter>) {
        self.setters.push(setter);
    }

    pub fn properties(&self, path: &str, keyword_mode: Option<&str>) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        for setter in &self.setters {
            setter.set_properties(path, keyword_mode, &mut properties);
        }
        properties
    }
}
