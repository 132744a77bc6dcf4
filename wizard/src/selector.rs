//! "Use previous / create new / select existing" choices shared by the
//! cluster, network, subnet, security group and stack questions.

use tracing::debug;

use crate::core::names::is_valid_stack_name;
use crate::core::stack::{StatusClass, classify_status};
use crate::io::console::Console;
use crate::io::provider::StackSummary;

/// Where a selected value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Previous,
    CreateNew,
    SelectExisting,
    Skip,
}

/// Ask which source to use. `None` when the operator goes back.
pub fn choose_source(
    console: &mut dyn Console,
    question: &str,
    options: &[(Source, String)],
) -> Option<Source> {
    let labels: Vec<String> = options.iter().map(|(_, label)| label.clone()).collect();
    let index = console.select(question, &labels)?;
    options.get(index).map(|(source, _)| *source)
}

/// Narrowing multi-select over `(id, label)` candidates.
///
/// Each pick removes the candidate from the list. Picking `done_label` (or
/// running out of candidates) returns the ids chosen so far; going back
/// returns `None`.
pub fn select_many(
    console: &mut dyn Console,
    question: &str,
    done_label: &str,
    mut candidates: Vec<(String, String)>,
) -> Option<Vec<String>> {
    let mut selected = Vec::new();
    while !candidates.is_empty() {
        let mut choices = Vec::with_capacity(candidates.len() + 1);
        choices.push(done_label.to_string());
        choices.extend(candidates.iter().map(|(_, label)| label.clone()));

        let index = console.select(question, &choices)?;
        if index == 0 {
            break;
        }
        let (id, _) = candidates.remove(index - 1);
        selected.push(id);
        console.say(&format!("Selected {} so far.\n", selected.join(", ")));
    }
    debug!(count = selected.len(), "multi-select finished");
    Some(selected)
}

/// Outcome of the stack-name question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackChoice {
    pub name: String,
    /// Stack id to update instead of creating a new stack.
    pub update_target: Option<String>,
    /// The name is the stack this session already installed.
    pub reuse: bool,
}

pub struct StackNamePrompt<'a> {
    /// Appended to the questions, e.g. " to create a VPC".
    pub purpose: &'a str,
    pub default_name: String,
    /// Name of the stack this session installed earlier, if any.
    pub previously_installed: Option<&'a str>,
    /// Shown before the install-or-update question.
    pub intro: Option<&'a str>,
}

const INSTALL_NEW: &str = "Install a new stack";
const UPDATE_EXISTING: &str = "Update and use an existing stack";

/// Stack-name sub-workflow: install under a new name, or update an existing
/// stack that is not in progress. `None` when the operator goes back.
pub fn ask_for_stack_name(
    console: &mut dyn Console,
    existing: &[StackSummary],
    prompt: &StackNamePrompt<'_>,
) -> Option<StackChoice> {
    if existing.is_empty() {
        return ask_for_new_stack_name(console, existing, prompt);
    }
    if let Some(intro) = prompt.intro {
        console.say(intro);
    }
    let question = format!(
        "Do you want to install a new CloudFormation stack{} or update and use an existing one?",
        prompt.purpose
    );
    let choices = vec![INSTALL_NEW.to_string(), UPDATE_EXISTING.to_string()];
    loop {
        match console.select(&question, &choices)? {
            0 => return ask_for_new_stack_name(console, existing, prompt),
            _ => {
                if let Some(choice) = ask_for_existing_stack(console, existing) {
                    return Some(choice);
                }
            }
        }
    }
}

fn ask_for_new_stack_name(
    console: &mut dyn Console,
    existing: &[StackSummary],
    prompt: &StackNamePrompt<'_>,
) -> Option<StackChoice> {
    let question = format!(
        "What do you want to name the CloudFormation stack{}? [{}]",
        prompt.purpose, prompt.default_name
    );
    loop {
        let answer = console.text(&question)?;
        let name = if answer.is_empty() {
            prompt.default_name.clone()
        } else {
            answer
        };

        if !is_valid_stack_name(&name) {
            console.say(
                "Stack names can only contain alphanumeric characters and dashes, no underscores.\n",
            );
            continue;
        }
        if prompt.previously_installed == Some(name.as_str()) {
            return Some(StackChoice {
                name,
                update_target: None,
                reuse: true,
            });
        }
        if existing.iter().any(|stack| stack.name == name) {
            console.say(&format!(
                "A stack named '{name}' already exists. Please choose another name or update the existing stack.\n"
            ));
            continue;
        }
        return Some(StackChoice {
            name,
            update_target: None,
            reuse: false,
        });
    }
}

fn ask_for_existing_stack(
    console: &mut dyn Console,
    existing: &[StackSummary],
) -> Option<StackChoice> {
    let labels: Vec<String> = existing
        .iter()
        .map(|stack| format!("{} ({})", stack.name, stack.status))
        .collect();
    loop {
        let index = console.select("Which stack do you want to update?", &labels)?;
        let stack = existing.get(index)?;
        if classify_status(&stack.status) == StatusClass::InProgress {
            console.say(&format!(
                "Stack '{}' is currently in progress ({}). Please wait until it finishes or choose another stack.\n",
                stack.name, stack.status
            ));
            continue;
        }
        return Some(StackChoice {
            name: stack.name.clone(),
            update_target: Some(stack.stack_id.clone()),
            reuse: false,
        });
    }
}
