//! Set difference between the desired and the previous state of a collection.
use std::collections::BTreeSet;

/// What to add and what to remove to get from one collection to another.
///
/// Both sides are sets, duplicates in the inputs collapse. They are kept
/// sorted so the calls made from them are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

fn to_set<I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_owned())
        .collect()
}

impl Diff {
    /// `added = desired - previous`, `removed = previous - desired`.
    pub fn new<D, P>(desired: D, previous: P) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let desired = to_set(desired);
        let previous = to_set(previous);
        Diff {
            added: desired.difference(&previous).cloned().collect(),
            removed: previous.difference(&desired).cloned().collect(),
        }
    }

    /// Adds all of `desired` and removes all of `previous`.
    ///
    /// Used when the collection now belongs to a different owner, in which
    /// case nothing carries over.
    pub fn replace<D, P>(desired: D, previous: P) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Diff {
            added: to_set(desired),
            removed: to_set(previous),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
