//! Category menu loaded from a JSON file.
//!
//! The file is a list of `{ "label": "...", "query": "..." }` entries; a
//! missing `query` falls back to the label. The user picks an entry by its
//! 1-based number.

use std::io::{BufRead, Write};
use std::path::Path;

use serde::Deserialize;

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub label: String,
    #[serde(default)]
    query: Option<String>,
}

impl Category {
    /// Identifier handed to the source adapter
    pub fn query(&self) -> &str {
        self.query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&self.label)
    }
}

pub fn load_categories(path: &Path) -> Result<Vec<Category>, HarvestError> {
    let unreadable = |reason: String| HarvestError::CategoriesUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    let categories: Vec<Category> =
        serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))?;

    if categories.is_empty() {
        return Err(unreadable("no categories listed".to_string()));
    }
    Ok(categories)
}

/// One `N. label` line per category.
pub fn render_menu(categories: &[Category]) -> String {
    categories
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("{}. {}\n", idx + 1, c.label))
        .collect()
}

/// Resolve a 1-based menu answer.
pub fn select<'a>(categories: &'a [Category], input: &str) -> Option<&'a Category> {
    let choice: usize = input.trim().parse().ok()?;
    categories.get(choice.checked_sub(1)?)
}

/// Show the menu and read answers until one is valid.
pub fn prompt_selection<R, W>(
    categories: &[Category],
    mut input: R,
    mut output: W,
) -> Result<Category, HarvestError>
where
    R: BufRead,
    W: Write,
{
    let io_error = |e: std::io::Error| HarvestError::Input(e.to_string());

    write!(output, "{}", render_menu(categories)).map_err(io_error)?;

    loop {
        write!(output, "Choose a category (1-{}): ", categories.len()).map_err(io_error)?;
        output.flush().map_err(io_error)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_error)? == 0 {
            return Err(HarvestError::Input("no category selected".to_string()));
        }

        match select(categories, &line) {
            Some(category) => return Ok(category.clone()),
            None => writeln!(output, "Invalid choice '{}'", line.trim()).map_err(io_error)?,
        }
    }
}
