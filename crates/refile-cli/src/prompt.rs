use dialoguer::{Confirm, Input};
use refile_core::{CoreError, DuplicateGroup, ReconciliationAction, Selector};

/// Plan lines shown before asking; the rest are summarized.
const PREVIEW_LINES: usize = 20;

/// Asks a yes/no question, treating a failed prompt as "no".
pub fn confirm(question: &str) -> bool {
    match Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("confirmation prompt failed: {e}");
            false
        }
    }
}

/// Shows a plan and asks whether to carry it out.
pub fn confirm_plan(actions: &[ReconciliationAction]) -> bool {
    println!();
    println!("Planned actions:");
    for action in actions.iter().take(PREVIEW_LINES) {
        println!("  {action}");
    }
    if actions.len() > PREVIEW_LINES {
        println!("  ... and {} more", actions.len() - PREVIEW_LINES);
    }
    let destructive = actions.iter().filter(|a| a.is_destructive()).count();
    confirm(&format!(
        "Proceed with {} actions ({destructive} move or remove content)?",
        actions.len()
    ))
}

/// Asks per group which members to remove.
///
/// Blank input keeps every member. Input that is not a list of numbers is
/// answered with a fresh prompt, as is any out-of-range number.
#[derive(Default)]
pub struct InteractiveSelector {
    aborted: bool,
}

impl InteractiveSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parses `"2, 3 4"` into `[2, 3, 4]`. Non-numeric tokens become `0`, which
/// no group accepts.
fn parse_indices(input: &str) -> Vec<usize> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse().unwrap_or(0))
        .collect()
}

impl Selector for InteractiveSelector {
    fn select(&mut self, group_index: usize, group: &DuplicateGroup) -> Vec<usize> {
        if self.aborted {
            return Vec::new();
        }
        println!();
        println!(
            "Group {} ({}, {} bytes each), hash {}:",
            group_index + 1,
            group.classification,
            group.size,
            group.digest
        );
        for (i, path) in group.paths().enumerate() {
            println!("  [{}] {}", i + 1, path.display());
        }

        let answer: Result<String, _> = Input::new()
            .with_prompt("Numbers to remove (blank keeps all)")
            .allow_empty(true)
            .interact_text();
        match answer {
            Ok(line) => parse_indices(&line),
            Err(e) => {
                tracing::error!("selection prompt failed: {e}; keeping remaining groups");
                self.aborted = true;
                Vec::new()
            }
        }
    }

    fn retry_on_invalid(&mut self, _group: &DuplicateGroup, error: &CoreError) -> bool {
        println!("  {error}");
        !self.aborted
    }
}
