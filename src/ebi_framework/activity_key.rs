use std::{
    collections::HashMap,
    fmt::{Debug, Display},
};

/// An interned label. Ids below `ActivityKey::get_number_of_activities` belong to the
/// model; ids above it are local to a single trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Activity {
    id: usize,
}

impl Activity {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl PartialEq<usize> for Activity {
    fn eq(&self, other: &usize) -> bool {
        &self.id == other
    }
}

impl Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ac{}", self.id)
    }
}

impl Debug for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ac{}", self.id)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ActivityKey {
    name2activity: HashMap<String, Activity>,
    activity2name: Vec<String>,
}

impl ActivityKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_number_of_activities(&self) -> usize {
        self.activity2name.len()
    }

    pub fn process_activity(&mut self, activity: &str) -> Activity {
        match self.name2activity.get(activity) {
            Some(index) => *index,
            None => {
                let result = Activity {
                    id: self.activity2name.len(),
                };
                self.activity2name.push(activity.to_string());
                self.name2activity.insert(activity.to_string(), result);
                result
            }
        }
    }

    pub fn get_activity(&self, label: &str) -> Option<Activity> {
        self.name2activity.get(label).copied()
    }

    pub fn get_activity_label(&self, activity: &Activity) -> Option<&str> {
        self.activity2name.get(activity.id).map(String::as_str)
    }

    /// Translates a trace to activities without touching the key: labels the key does not
    /// know get fresh ids beyond the key's range, equal labels sharing an id.
    pub fn translate_trace<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Vec<Activity> {
        let mut local: HashMap<&'a str, Activity> = HashMap::new();
        labels
            .into_iter()
            .map(|label| match self.name2activity.get(label) {
                Some(activity) => *activity,
                None => {
                    let next = self.activity2name.len() + local.len();
                    *local.entry(label).or_insert(Activity { id: next })
                }
            })
            .collect()
    }
}
