use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::errors::TemplateError;
use crate::template::loader::{TemplateFormat, load_template_path};
use crate::template::model::Template;

/// Templates keyed by id.
#[derive(Debug, Default, Clone)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yaml`, `*.yml` and `*.json` file of a directory, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut catalog = Self::new();
        catalog.load_dir(dir)?;
        Ok(catalog)
    }

    pub fn insert(&mut self, template: Template) -> Result<(), TemplateError> {
        let id = template.template.id.clone();
        if self.templates.contains_key(&id) {
            return Err(TemplateError::DuplicateTemplate(id));
        }
        self.templates.insert(id, template);
        Ok(())
    }

    /// Insert or replace a template, returning the previous one.
    pub fn replace(&mut self, template: Template) -> Option<Template> {
        self.templates
            .insert(template.template.id.clone(), template)
    }

    pub fn get(&self, id: &str) -> Result<&Template, TemplateError> {
        self.templates
            .get(id)
            .ok_or_else(|| TemplateError::UnknownTemplate(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Returns the number of templates added.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, TemplateError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && TemplateFormat::from_path(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let validated = load_template_path(path)?;
            self.insert(validated.template)?;
        }
        info!(
            event = "templates_loaded",
            dir = %dir.display(),
            count = paths.len()
        );
        Ok(paths.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, id: &str) {
        let body = format!(
            "template:\n  id: {id}\n  version: \"1\"\n  name: {id}\nrequirements:\n  overall_minimum: 50\n  dimension_minimums:\n    consistency: 0\n"
        );
        std::fs::write(dir.join(name), body).expect("write template");
    }

    #[test]
    fn loads_directory_and_skips_other_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "b.yaml", "beta");
        write(dir.path(), "a.yml", "alpha");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let catalog = TemplateCatalog::from_dir(dir.path()).expect("catalog");
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert!(catalog.get("alpha").is_ok());
        assert!(matches!(
            catalog.get("gamma"),
            Err(TemplateError::UnknownTemplate(id)) if id == "gamma"
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "one.yaml", "same");
        write(dir.path(), "two.yaml", "same");
        assert!(matches!(
            TemplateCatalog::from_dir(dir.path()),
            Err(TemplateError::DuplicateTemplate(id)) if id == "same"
        ));
    }

    #[test]
    fn replace_swaps_existing_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "one.yaml", "same");
        let mut catalog = TemplateCatalog::from_dir(dir.path()).expect("catalog");
        let mut template = catalog.get("same").expect("template").clone();
        template.requirements.overall_minimum = 75.0;
        assert!(catalog.replace(template).is_some());
        assert_eq!(
            catalog.get("same").expect("template").requirements.overall_minimum,
            75.0
        );
        assert_eq!(catalog.len(), 1);
    }
}
