use crate::lsx::{Document, Node};
use anyhow::{Context, Result};
use std::{fmt, path::Path};

/// Name of the base-game module. Always present in the list, never a mod.
pub const BASE_MODULE: &str = "GustavDev";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// First descendant whose `id` attribute equals the given value.
    Descendant(&'static str),
    /// First child element, whatever it is called.
    FirstChild,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Descendant(id) => write!(f, "node with id \"{id}\""),
            Step::FirstChild => write!(f, "child element"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected settings layout: step {step} found no {expected} below {within}")]
pub struct SchemaError {
    pub step: usize,
    pub expected: Step,
    pub within: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaPath {
    steps: &'static [Step],
}

/// `save > region#ModuleSettings > node#root > children > node#Mods > children`
pub const MOD_LIST: SchemaPath = SchemaPath::new(&[
    Step::Descendant("ModuleSettings"),
    Step::Descendant("root"),
    Step::FirstChild,
    Step::Descendant("Mods"),
    Step::FirstChild,
]);

impl SchemaPath {
    pub const fn new(steps: &'static [Step]) -> Self {
        Self { steps }
    }

    pub fn resolve<'a>(&self, document: &'a Document) -> Result<&'a Node, SchemaError> {
        let mut current = document.root();
        for (step, expected) in self.steps.iter().enumerate() {
            let next = match expected {
                Step::Descendant(id) => current
                    .find_descendant(|node| node.id() == Some(*id))
                    .ok(),
                Step::FirstChild => current.first_element(),
            };
            current = next.ok_or_else(|| SchemaError {
                step,
                expected: *expected,
                within: current.label(),
            })?;
        }
        Ok(current)
    }
}

/// Display names of the mods in `document`, in load order.
pub fn extract_mod_names(document: &Document) -> Result<Vec<String>, SchemaError> {
    let anchor = MOD_LIST.resolve(document)?;
    Ok(anchor
        .elements()
        .filter_map(|module| module.attribute_value("Name"))
        .filter(|name| !name.is_empty() && *name != BASE_MODULE)
        .map(str::to_string)
        .collect())
}

pub fn read_mod_names(path: &Path) -> Result<Vec<String>> {
    let document = Document::load(path)?;
    let names = extract_mod_names(&document)
        .with_context(|| format!("read mod list from {}", path.display()))?;
    Ok(names)
}

#[cfg(test)]
pub(crate) fn settings_with_mods(names: &[&str]) -> String {
    let mut modules = String::new();
    for name in names {
        modules.push_str(&format!(
            "                        <node id=\"ModuleShortDesc\">\n\
             \x20                           <attribute id=\"Folder\" type=\"LSString\" value=\"{name}\"/>\n\
             \x20                           <attribute id=\"Name\" type=\"LSString\" value=\"{name}\"/>\n\
             \x20                       </node>\n"
        ));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <save>\n\
         \x20   <version major=\"4\" minor=\"7\" revision=\"1\" build=\"3\"/>\n\
         \x20   <region id=\"ModuleSettings\">\n\
         \x20       <node id=\"root\">\n\
         \x20           <children>\n\
         \x20               <node id=\"Mods\">\n\
         \x20                   <children>\n\
         {modules}\
         \x20                   </children>\n\
         \x20               </node>\n\
         \x20           </children>\n\
         \x20       </node>\n\
         \x20   </region>\n\
         </save>\n"
    )
}
