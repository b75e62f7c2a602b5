//! Symbol name transforms, applied as symbols are read.

use regex::Regex;

use crate::config::TransformRule;
use crate::domain::{ConvertError, Result};

/// Rewrites a symbol name found in the file at `path`.
pub trait SymbolTransform: Send + Sync {
    fn transform(&self, path: &str, name: &str) -> String;
}

/// Replace every match of a regex.
#[derive(Debug, Clone)]
pub struct RegexSymbolTransform {
    pattern: Regex,
    replacement: String,
}

impl RegexSymbolTransform {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ConvertError::configuration(format!("invalid symbol transform '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }
}

impl SymbolTransform for RegexSymbolTransform {
    fn transform(&self, _path: &str, name: &str) -> String {
        self.pattern
            .replace_all(name, self.replacement.as_str())
            .into_owned()
    }
}

/// Transforms applied in order.
#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn SymbolTransform>>,
}

impl TransformChain {
    pub fn from_rules(rules: &[TransformRule]) -> Result<Self> {
        let mut chain = Self::default();
        for rule in rules {
            chain.push(RegexSymbolTransform::new(&rule.pattern, &rule.replacement)?);
        }
        Ok(chain)
    }

    pub fn push(&mut self, transform: impl SymbolTransform + 'static) {
        self.transforms.push(Box::new(transform));
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl SymbolTransform for TransformChain {
    fn transform(&self, path: &str, name: &str) -> String {
        self.transforms
            .iter()
            .fold(name.to_string(), |current, t| t.transform(path, &current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_transform_uses_groups() {
        let t = RegexSymbolTransform::new(r"^release-(\d+)-(\d+)$", "REL_${1}_$2").unwrap();
        assert_eq!(t.transform("a.c", "release-1-2"), "REL_1_2");
        assert_eq!(t.transform("a.c", "other"), "other");
    }

    #[test]
    fn test_chain_applies_in_order() {
        let chain = TransformChain::from_rules(&[
            TransformRule {
                pattern: "-".to_string(),
                replacement: "_".to_string(),
            },
            TransformRule {
                pattern: "^v_".to_string(),
                replacement: "V".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(chain.transform("a.c", "v-1-0"), "V1_0");
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        assert!(matches!(
            RegexSymbolTransform::new("(", "x"),
            Err(ConvertError::Configuration { .. })
        ));
    }
}
