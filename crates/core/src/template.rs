//! Newsletter templates and their fill-in data.
//!
//! Template-based newsletters store a [`TemplateData`] record alongside the
//! chosen [`NewsletterTemplate`]. Rendering goes through minijinja with HTML
//! auto-escaping, so subscriber-visible text can never inject markup.

use std::fmt;
use std::str::FromStr;

use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const MODERN_SOURCE: &str = include_str!("../templates/modern.html");
const PROFESSIONAL_SOURCE: &str = include_str!("../templates/professional.html");
const MINIMAL_SOURCE: &str = include_str!("../templates/minimal.html");

/// Fields a template-based newsletter must fill in.
pub const REQUIRED_TEMPLATE_FIELDS: &[&str] = &[
    "email_title",
    "introduction_text",
    "feature_1_title",
    "feature_1_description",
];

/// The built-in newsletter layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsletterTemplate {
    #[default]
    Modern,
    Professional,
    Minimal,
}

impl NewsletterTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modern => "modern",
            Self::Professional => "professional",
            Self::Minimal => "minimal",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Self::Modern => "modern.html",
            Self::Professional => "professional.html",
            Self::Minimal => "minimal.html",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Modern => MODERN_SOURCE,
            Self::Professional => PROFESSIONAL_SOURCE,
            Self::Minimal => MINIMAL_SOURCE,
        }
    }
}

impl fmt::Display for NewsletterTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsletterTemplate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modern" => Ok(Self::Modern),
            "professional" => Ok(Self::Professional),
            "minimal" => Ok(Self::Minimal),
            other => Err(CoreError::Validation(format!(
                "Unknown template '{other}'. Must be one of: modern, professional, minimal"
            ))),
        }
    }
}

/// Fill-in values for the built-in templates.
///
/// Unknown keys in the stored JSON are ignored and missing ones fall back to
/// the defaults below, so older rows keep rendering after fields are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateData {
    pub email_title: String,
    pub introduction_text: String,
    pub feature_1_title: String,
    pub feature_1_description: String,
    pub feature_1_image: String,
    pub feature_2_title: String,
    pub feature_2_description: String,
    pub feature_2_image: String,
    pub feature_3_title: String,
    pub feature_3_description: String,
    pub feature_3_image: String,
    pub cta_text: String,
    pub cta_url: String,
    pub company_name: String,
    pub company_address: String,
    pub support_email: String,
    pub website_url: String,
    pub website_domain: String,
    pub help_center_url: String,
    pub updates_url: String,
    pub blog_url: String,
    pub facebook_url: String,
    pub youtube_url: String,
    pub instagram_url: String,
    pub unsubscribe_url: String,
}

impl Default for TemplateData {
    fn default() -> Self {
        Self {
            email_title: String::new(),
            introduction_text: String::new(),
            feature_1_title: String::new(),
            feature_1_description: String::new(),
            feature_1_image: String::new(),
            feature_2_title: String::new(),
            feature_2_description: String::new(),
            feature_2_image: String::new(),
            feature_3_title: String::new(),
            feature_3_description: String::new(),
            feature_3_image: String::new(),
            cta_text: String::new(),
            cta_url: String::new(),
            company_name: "Our Company".into(),
            company_address: String::new(),
            support_email: String::new(),
            website_url: String::new(),
            website_domain: String::new(),
            help_center_url: String::new(),
            updates_url: String::new(),
            blog_url: String::new(),
            facebook_url: String::new(),
            youtube_url: String::new(),
            instagram_url: String::new(),
            unsubscribe_url: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Feature<'a> {
    title: &'a str,
    description: &'a str,
    image: &'a str,
}

impl TemplateData {
    /// Parse stored JSON into template data. `null` yields the defaults.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid template data: {e}")))
    }

    /// Reject data missing any of [`REQUIRED_TEMPLATE_FIELDS`].
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing: Vec<&str> = [
            ("email_title", &self.email_title),
            ("introduction_text", &self.introduction_text),
            ("feature_1_title", &self.feature_1_title),
            ("feature_1_description", &self.feature_1_description),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Missing required template fields: {}",
                missing.join(", ")
            )))
        }
    }

    fn features(&self) -> Vec<Feature<'_>> {
        [
            (&self.feature_1_title, &self.feature_1_description, &self.feature_1_image),
            (&self.feature_2_title, &self.feature_2_description, &self.feature_2_image),
            (&self.feature_3_title, &self.feature_3_description, &self.feature_3_image),
        ]
        .into_iter()
        .filter(|(title, _, _)| !title.trim().is_empty())
        .map(|(title, description, image)| Feature {
            title,
            description,
            image,
        })
        .collect()
    }
}

/// Render `template` filled with `data`. `year` goes into the footer.
pub fn render_template(
    template: NewsletterTemplate,
    data: &TemplateData,
    year: i32,
) -> Result<String, CoreError> {
    let mut env = Environment::new();
    env.add_template(template.file_name(), template.source())
        .map_err(template_error)?;
    let tmpl = env.get_template(template.file_name()).map_err(template_error)?;

    tmpl.render(context! {
        email_title => data.email_title,
        introduction_text => data.introduction_text,
        features => data.features(),
        cta_text => data.cta_text,
        cta_url => data.cta_url,
        company_name => data.company_name,
        company_address => data.company_address,
        support_email => data.support_email,
        website_url => data.website_url,
        website_domain => data.website_domain,
        help_center_url => data.help_center_url,
        updates_url => data.updates_url,
        blog_url => data.blog_url,
        facebook_url => data.facebook_url,
        youtube_url => data.youtube_url,
        instagram_url => data.instagram_url,
        unsubscribe_url => data.unsubscribe_url,
        year => year,
    })
    .map_err(template_error)
}

fn template_error(err: minijinja::Error) -> CoreError {
    CoreError::Internal(format!("Template rendering failed: {err}"))
}
