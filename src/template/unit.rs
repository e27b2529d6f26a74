//! Compiled template units.

use super::{CompileError, Helpers, ROOT_DEFINITION};
use crate::asset::AssetSource;
use minijinja::{
    Environment, Error,
    machinery::{WhitespaceConfig, ast, parse},
    syntax::SyntaxConfig,
};
use serde::Serialize;

/// Parsed, executable artifact for one template set.
///
/// Immutable once built; the registry replaces units wholesale.
#[derive(Debug)]
pub struct CompiledTemplate {
    name: String,
    fragments: Vec<String>,
    env: Environment<'static>,
}

impl CompiledTemplate {
    /// Fetch every fragment, parse the concatenation as one unit with
    /// `helpers` bound, and verify the root definition exists.
    ///
    /// No template code runs here; top-level statements are evaluated on
    /// each render with the request's data.
    ///
    /// `fragments` is the full list (set fragments then layout); the unit
    /// is named after the first one.
    pub fn compile(
        fragments: Vec<String>,
        source: &dyn AssetSource,
        helpers: &Helpers,
    ) -> Result<Self, CompileError> {
        let Some(name) = fragments.first().cloned() else {
            return Err(CompileError::EmptySet {
                group: String::new(),
            });
        };

        let mut text = String::new();
        let mut starts = Vec::with_capacity(fragments.len());
        let mut line = 1;
        for fragment in &fragments {
            let bytes = source.fetch(fragment).map_err(|source| CompileError::Asset {
                fragment: fragment.clone(),
                source,
            })?;
            let part = String::from_utf8(bytes).map_err(|_| CompileError::Encoding {
                fragment: fragment.clone(),
            })?;

            starts.push(line);
            line += part.lines().count().max(1);
            text.push_str(&part);
            if !part.ends_with('\n') {
                text.push('\n');
            }
        }

        let parse_error = |source: Error| {
            let located = source
                .line()
                .and_then(|l| locate(&starts, l).map(|(i, local)| (fragments[i].clone(), local)));
            let (fragment, line) = located.unzip();
            CompileError::Parse {
                set: fragments.clone(),
                fragment,
                line,
                source,
            }
        };

        let has_root = defines_root(&text, &name).map_err(parse_error)?;

        let mut env = Environment::new();
        helpers.bind(&mut env);
        env.add_template_owned(name.clone(), text)
            .map_err(parse_error)?;
        if !has_root {
            return Err(CompileError::MissingRoot { set: fragments });
        }

        Ok(Self {
            name,
            fragments,
            env,
        })
    }

    /// Registry key of this unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fragments the unit was built from, set first then layout.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Execute the root definition with `data` as the template context.
    pub fn render<S: Serialize>(&self, data: S) -> Result<String, Error> {
        let template = self.env.get_template(&self.name)?;
        let state = template.eval_to_state(data)?;
        state.call_macro(ROOT_DEFINITION, &[])
    }
}

/// Whether `source` declares the root macro at top level.
fn defines_root(source: &str, name: &str) -> Result<bool, Error> {
    let ast::Stmt::Template(template) =
        parse(source, name, SyntaxConfig::default(), WhitespaceConfig::default())?
    else {
        return Ok(false);
    };
    Ok(template.children.iter().any(
        |stmt| matches!(stmt, ast::Stmt::Macro(m) if m.name == ROOT_DEFINITION),
    ))
}

/// Map a line in the concatenated source onto `(fragment index, local line)`.
fn locate(starts: &[usize], line: usize) -> Option<(usize, usize)> {
    let index = starts.iter().rposition(|&start| start <= line)?;
    Some((index, line - starts[index] + 1))
}
