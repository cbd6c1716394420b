use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::codec::{self, CodecError};
use crate::spec::field::Field;
use crate::spec::form::FormTemplate;

const BUILTIN: [(&str, &str); 3] = [
    ("contact", include_str!("../templates/contact.json")),
    ("registration", include_str!("../templates/registration.json")),
    ("feedback", include_str!("../templates/feedback.json")),
];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    Unknown(String),
    #[error("template '{id}' is invalid: {source}")]
    Invalid {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn template_ids() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(id, _)| *id)
}

pub fn builtin_templates() -> Result<Vec<FormTemplate>, TemplateError> {
    BUILTIN
        .iter()
        .map(|(id, json)| parse_template(id, json))
        .collect()
}

pub fn find_template(id: &str) -> Result<FormTemplate, TemplateError> {
    let (id, json) = BUILTIN
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .ok_or_else(|| TemplateError::Unknown(id.to_string()))?;
    parse_template(id, json)
}

fn parse_template(id: &str, json: &str) -> Result<FormTemplate, TemplateError> {
    serde_json::from_str(json).map_err(|source| TemplateError::Invalid {
        id: id.to_string(),
        source,
    })
}

impl FormTemplate {
    /// Copies the template fields under fresh ids, rewriting conditional
    /// references so they point at the copies. A template with blank or
    /// repeated ids or labels is rejected.
    pub fn instantiate(&self) -> Result<Vec<Field>, CodecError> {
        codec::validate_fields(&self.fields)?;
        let ids: HashMap<&str, String> = self
            .fields
            .iter()
            .map(|field| (field.id.as_str(), Uuid::new_v4().to_string()))
            .collect();

        let fields = self
            .fields
            .iter()
            .map(|field| {
                let mut copy = field.clone();
                if let Some(id) = ids.get(field.id.as_str()) {
                    copy.id = id.clone();
                }
                if let Some(conditional) = copy.conditional.as_mut() {
                    for condition in [&mut conditional.show_if, &mut conditional.hide_if]
                        .into_iter()
                        .flatten()
                    {
                        if let Some(target) = condition
                            .field_id
                            .as_deref()
                            .and_then(|target| ids.get(target))
                        {
                            condition.field_id = Some(target.clone());
                        }
                    }
                }
                copy
            })
            .collect();
        Ok(fields)
    }
}
