//! Command line rewriting for relaunches.

use std::ffi::{OsStr, OsString};

use crate::options::{NO_UAC_FLAG, RESTARTING_FLAG, UAC_FLAG};

/// A flag and the values that follow it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgGroup {
    /// Every spelling of the flag. The first one is used when the group is written out.
    pub names: Vec<String>,
    pub values: Vec<OsString>,
}

/// Arguments discovered during startup that a relaunch must carry over.
///
/// A `Nested` tree holds further trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTree {
    Group(ArgGroup),
    Nested(Vec<ArgTree>),
}

impl Default for ArgTree {
    fn default() -> Self {
        Self::Nested(Vec::new())
    }
}

impl ArgTree {
    pub fn group<V>(names: &[&str], values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<OsString>,
    {
        Self::Group(ArgGroup {
            names: names.iter().map(|n| n.to_string()).collect(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Adds `tree` as a child, turning a lone group into a nested tree first.
    pub fn push(&mut self, tree: ArgTree) {
        match self {
            Self::Nested(children) => children.push(tree),
            Self::Group(_) => {
                let current = std::mem::take(self);
                *self = Self::Nested(vec![current, tree]);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurrence {
    /// `-o value` or `--game-path value`
    Separate(usize),
    /// `-ovalue`, `-o=value` or `--game-path=value`
    Joined(usize),
}

fn is_joined(arg: &[u8], name: &str) -> bool {
    let name = name.as_bytes();
    if arg.len() <= name.len() || !arg.starts_with(name) {
        return false;
    }
    if name.starts_with(b"--") {
        arg[name.len()] == b'='
    } else {
        // short flags take their value attached
        name.len() == 2 && !arg.starts_with(b"--")
    }
}

fn find_flag(argv: &[OsString], names: &[String]) -> Option<Occurrence> {
    argv.iter().enumerate().find_map(|(at, arg)| {
        let bytes = arg.as_encoded_bytes();
        if names.iter().any(|name| bytes == name.as_bytes()) {
            Some(Occurrence::Separate(at))
        } else if names.iter().any(|name| is_joined(bytes, name)) {
            Some(Occurrence::Joined(at))
        } else {
            None
        }
    })
}

/// Writes `tree` into `argv`.
///
/// A group whose flag is already present, in any spelling, takes its place:
/// values following a separate flag are overwritten (those that run past the
/// end are appended) and a flag with its value attached is replaced whole.
/// Groups whose flag is missing are appended.
pub fn merge_args(argv: &mut Vec<OsString>, tree: &ArgTree) {
    let group = match tree {
        ArgTree::Nested(children) => {
            for child in children {
                merge_args(argv, child);
            }
            return;
        }
        ArgTree::Group(group) => group,
    };
    let Some(flag) = group.names.first() else {
        return;
    };
    let written = std::iter::once(OsString::from(flag)).chain(group.values.iter().cloned());

    match find_flag(argv, &group.names) {
        Some(Occurrence::Separate(at)) => {
            for (offset, value) in group.values.iter().enumerate() {
                let slot = at + 1 + offset;
                if slot < argv.len() {
                    argv[slot] = value.clone();
                } else {
                    argv.push(value.clone());
                }
            }
        }
        Some(Occurrence::Joined(at)) => {
            argv.splice(at..=at, written);
        }
        None => argv.extend(written),
    }
}

/// Keeps exactly one occurrence of `marker`, adding it at the end when missing.
pub fn ensure_marker(argv: &mut Vec<OsString>, marker: &str) {
    let mut seen = false;
    argv.retain(|arg| {
        if arg.as_os_str() != OsStr::new(marker) {
            return true;
        }
        !std::mem::replace(&mut seen, true)
    });
    if !seen {
        argv.push(OsString::from(marker));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    /// Arguments for the new process, without the program name.
    pub args: Vec<OsString>,
    pub elevate: bool,
}

impl RestartRequest {
    pub fn new(original: &[OsString], discovered: &ArgTree, elevate: bool) -> Self {
        let mut args = original.to_vec();
        ensure_marker(&mut args, RESTARTING_FLAG);
        // a restarted process has already been through the elevation prompt,
        // and the two flags are mutually exclusive
        args.retain(|arg| arg.as_os_str() != OsStr::new(UAC_FLAG));
        ensure_marker(&mut args, NO_UAC_FLAG);
        merge_args(&mut args, discovered);
        Self { args, elevate }
    }
}
