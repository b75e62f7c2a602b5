//! Symbol hints file.
//!
//! One hint per line, whitespace separated:
//!
//! ```text
//! project-id  symbol  conversion  [svn-path  [parent-lod-name]]
//! ```
//!
//! `project-id` is numeric or `.` for any project; `conversion` is
//! `branch`, `tag`, `exclude` or `.`; `svn-path` is a target path or `.`;
//! `parent-lod-name` is a symbol name, `.trunk.` for trunk, or `.`.
//! Blank lines and lines starting with `#` are ignored.

use std::fmt;
use std::path::Path;

use crate::domain::{ConvertError, ProjectId, Result};

pub const TRUNK_SENTINEL: &str = ".trunk.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintConversion {
    Branch,
    Tag,
    Exclude,
}

impl fmt::Display for HintConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::Exclude => "exclude",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentHint {
    Trunk,
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolHint {
    /// `None` matches every project.
    pub project: Option<ProjectId>,
    pub name: String,
    pub conversion: Option<HintConversion>,
    pub svn_path: Option<String>,
    pub parent: Option<ParentHint>,
}

impl fmt::Display for SymbolHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.project {
            Some(p) => write!(f, "{p}")?,
            None => f.write_str(".")?,
        }
        write!(f, " {}", self.name)?;
        match self.conversion {
            Some(c) => write!(f, " {c}")?,
            None => f.write_str(" .")?,
        }
        write!(f, " {}", self.svn_path.as_deref().unwrap_or("."))?;
        match &self.parent {
            Some(ParentHint::Trunk) => write!(f, " {TRUNK_SENTINEL}"),
            Some(ParentHint::Symbol(name)) => write!(f, " {name}"),
            None => f.write_str(" ."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolHints {
    hints: Vec<SymbolHint>,
}

impl SymbolHints {
    pub fn new(hints: Vec<SymbolHint>) -> Self {
        Self { hints }
    }

    /// Parse a hints file, reporting every bad line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut hints: Vec<SymbolHint> = Vec::new();
        let mut problems = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_line(trimmed) {
                Ok(hint) => {
                    if hints
                        .iter()
                        .any(|h| h.project == hint.project && h.name == hint.name)
                    {
                        problems.push(format!(
                            "symbol hints line {line_no}: duplicate hint for '{}'",
                            hint.name
                        ));
                    } else {
                        hints.push(hint);
                    }
                }
                Err(problem) => problems.push(format!("symbol hints line {line_no}: {problem}")),
            }
        }

        if problems.is_empty() {
            Ok(Self { hints })
        } else {
            Err(ConvertError::Configuration { problems })
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Load `path` if given, otherwise an empty set.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Hint for `name` in `project`; a project-specific hint beats a
    /// wildcard one.
    pub fn lookup(&self, project: ProjectId, name: &str) -> Option<&SymbolHint> {
        self.hints
            .iter()
            .find(|h| h.project == Some(project) && h.name == name)
            .or_else(|| {
                self.hints
                    .iter()
                    .find(|h| h.project.is_none() && h.name == name)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolHint> {
        self.hints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// Render in the format accepted by [`SymbolHints::parse`].
    pub fn render(&self) -> String {
        let mut out = String::from("# project-id symbol conversion svn-path parent-lod-name\n");
        for hint in &self.hints {
            out.push_str(&hint.to_string());
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

fn parse_line(line: &str) -> std::result::Result<SymbolHint, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 || fields.len() > 5 {
        return Err(format!("expected 3 to 5 fields, found {}", fields.len()));
    }

    let project = match fields[0] {
        "." => None,
        raw => Some(ProjectId(
            raw.parse()
                .map_err(|_| format!("invalid project id '{raw}'"))?,
        )),
    };
    let name = fields[1].to_string();
    let conversion = match fields[2] {
        "." => None,
        "branch" => Some(HintConversion::Branch),
        "tag" => Some(HintConversion::Tag),
        "exclude" => Some(HintConversion::Exclude),
        other => return Err(format!("unknown conversion '{other}'")),
    };
    let svn_path = match fields.get(3) {
        None | Some(&".") => None,
        Some(path) => Some(path.trim_matches('/').to_string()),
    };
    let parent = match fields.get(4) {
        None | Some(&".") => None,
        Some(&TRUNK_SENTINEL) => Some(ParentHint::Trunk),
        Some(name) => Some(ParentHint::Symbol(name.to_string())),
    };

    if conversion == Some(HintConversion::Exclude) && (svn_path.is_some() || parent.is_some()) {
        return Err(format!("excluded symbol '{name}' cannot have a path or parent"));
    }

    Ok(SymbolHint {
        project,
        name,
        conversion,
        svn_path,
        parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_column_forms() {
        let hints = SymbolHints::parse(
            "# comment\n\
             \n\
             0 REL_1 tag\n\
             . VENDOR exclude\n\
             0 FEATURE branch /branches/feature .trunk.\n\
             1 FIX . . FEATURE\n",
        )
        .unwrap();

        let rel = hints.lookup(ProjectId(0), "REL_1").unwrap();
        assert_eq!(rel.conversion, Some(HintConversion::Tag));
        assert_eq!(rel.parent, None);

        let vendor = hints.lookup(ProjectId(7), "VENDOR").unwrap();
        assert_eq!(vendor.conversion, Some(HintConversion::Exclude));

        let feature = hints.lookup(ProjectId(0), "FEATURE").unwrap();
        assert_eq!(feature.svn_path.as_deref(), Some("branches/feature"));
        assert_eq!(feature.parent, Some(ParentHint::Trunk));

        let fix = hints.lookup(ProjectId(1), "FIX").unwrap();
        assert_eq!(fix.conversion, None);
        assert_eq!(fix.parent, Some(ParentHint::Symbol("FEATURE".to_string())));
        assert!(hints.lookup(ProjectId(0), "FIX").is_none());
    }

    #[test]
    fn test_project_specific_hint_wins() {
        let hints = SymbolHints::parse(". X tag\n2 X branch\n").unwrap();
        assert_eq!(
            hints.lookup(ProjectId(2), "X").unwrap().conversion,
            Some(HintConversion::Branch)
        );
        assert_eq!(
            hints.lookup(ProjectId(0), "X").unwrap().conversion,
            Some(HintConversion::Tag)
        );
    }

    #[test]
    fn test_every_bad_line_reported() {
        let err = SymbolHints::parse("0 A\n0 B flavor\nx C tag\n0 D exclude path\n0 E tag\n0 E tag\n")
            .unwrap_err();
        match err {
            ConvertError::Configuration { problems } => {
                assert_eq!(problems.len(), 5);
                assert!(problems[0].starts_with("symbol hints line 1"));
                assert!(problems[4].contains("duplicate"));
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_render_parses_back() {
        let hints = SymbolHints::new(vec![
            SymbolHint {
                project: Some(ProjectId(0)),
                name: "B".to_string(),
                conversion: Some(HintConversion::Branch),
                svn_path: Some("branches/B".to_string()),
                parent: Some(ParentHint::Trunk),
            },
            SymbolHint {
                project: Some(ProjectId(0)),
                name: "T".to_string(),
                conversion: Some(HintConversion::Tag),
                svn_path: Some("tags/T".to_string()),
                parent: Some(ParentHint::Symbol("B".to_string())),
            },
        ]);
        let text = hints.render();
        assert!(text.contains("0 B branch branches/B .trunk.\n"));
        assert_eq!(SymbolHints::parse(&text).unwrap(), hints);
    }
}
