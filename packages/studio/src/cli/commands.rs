//! Line commands accepted by `studio watch` on stdin.

use tractor_studio::StateDispatcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(String),
    Rename { id: String, name: String },
    Add { parent: Option<String> },
    Delete(String),
    Expand(String),
    Collapse(String),
    Move { id: String, index: i64 },
    AttachComponent { id: String, component: String },
    DetachComponent { id: String, component: String },
    Call(String),
    Reload,
    Print,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  select ID              select a node
  rename ID NAME...      rename a node
  add [PARENT_ID]        create a node (top level without a parent)
  delete ID              delete a node
  expand ID | collapse ID
  move ID INDEX          change sibling order
  attach ID COMPONENT    add a component
  detach ID COMPONENT    remove a component
  call PATH              invoke a component method
  reload                 ask the workspace to re-push state
  print | help | quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let mut arg = |what: &str| {
            words
                .next()
                .map(str::to_string)
                .ok_or_else(|| format!("{verb}: missing {what}"))
        };

        let command = match verb {
            "select" => Self::Select(arg("ID")?),
            "rename" => {
                let id = arg("ID")?;
                let name: Vec<&str> = words.collect();
                if name.is_empty() {
                    return Err("rename: missing NAME".to_string());
                }
                return Ok(Self::Rename {
                    id,
                    name: name.join(" "),
                });
            }
            "add" => Self::Add {
                parent: words.next().map(str::to_string),
            },
            "delete" => Self::Delete(arg("ID")?),
            "expand" => Self::Expand(arg("ID")?),
            "collapse" => Self::Collapse(arg("ID")?),
            "move" => {
                let id = arg("ID")?;
                let index = arg("INDEX")?
                    .parse()
                    .map_err(|e| format!("move: bad INDEX: {e}"))?;
                Self::Move { id, index }
            }
            "attach" => Self::AttachComponent {
                id: arg("ID")?,
                component: arg("COMPONENT")?,
            },
            "detach" => Self::DetachComponent {
                id: arg("ID")?,
                component: arg("COMPONENT")?,
            },
            "call" => Self::Call(arg("PATH")?),
            "reload" => Self::Reload,
            "print" => Self::Print,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command {other:?} (try `help`)")),
        };
        Ok(command)
    }

    /// Apply a command that edits the workspace or the local view. Returns
    /// an error line for ids the displayed tree does not know.
    pub fn apply(&self, dispatcher: &StateDispatcher) -> Result<(), String> {
        match self {
            Self::Select(id) => {
                if !dispatcher.select(id) {
                    return Err(format!("no node {id}"));
                }
            }
            Self::Rename { id, name } => dispatcher.rename_node(id, name),
            Self::Add { parent } => dispatcher.append_node(parent.as_deref(), None),
            Self::Delete(id) => dispatcher.delete_node(id),
            Self::Expand(id) | Self::Collapse(id) => {
                if !dispatcher.set_expanded(id, matches!(self, Self::Expand(_))) {
                    return Err(format!("no node {id}"));
                }
            }
            Self::Move { id, index } => dispatcher.move_node(id, *index),
            Self::AttachComponent { id, component } => dispatcher.append_component(id, component),
            Self::DetachComponent { id, component } => dispatcher.remove_component(id, component),
            Self::Call(path) => dispatcher.call_method(path),
            Self::Reload => dispatcher.reload(),
            Self::Print | Self::Help | Self::Quit => {}
        }
        Ok(())
    }
}
