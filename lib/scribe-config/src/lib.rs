//! Primitives for loading typed configuration data.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{borrow::Cow, path::Path};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider as _,
};
use scribe_error::GenericError;
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

mod provider;
use self::provider::ResolvedProvider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        ///
        /// Includes the matching environment variable name when environment variables were loaded.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// A field held a value of the wrong data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration."))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        from_figment_error(None, e)
    }
}

struct BoxedProvider(Box<dyn figment::Provider + Send + Sync>);

impl figment::Provider for BoxedProvider {
    fn metadata(&self) -> figment::Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        self.0.data()
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources have an implicit priority based on the order in which they are added: sources added later take precedence
/// over sources added earlier. Once all sources are added, the merged configuration is deserialized with
/// [`into_typed`][Self::into_typed].
///
/// # Supported sources
///
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
#[derive(Default)]
pub struct ConfigurationLoader {
    env_prefix: Option<String>,
    providers: Vec<BoxedProvider>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let resolved_provider = ResolvedProvider::from_yaml(&path)
            .map_err(GenericError::from)
            .context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    ///
    /// Errors include the file not existing, not being readable/accessible, and not being valid YAML.
    pub fn try_from_yaml<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match ResolvedProvider::from_yaml(&path) {
            Ok(resolved_provider) => self.providers.push(BoxedProvider(Box::new(resolved_provider))),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().display(), "Unable to read YAML configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let resolved_provider = ResolvedProvider::from_json(&path)
            .map_err(GenericError::from)
            .context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Loads the given configuration file, picking the format from its extension.
    ///
    /// Files ending in `.json` are read as JSON, and everything else as YAML.
    ///
    /// # Errors
    ///
    /// If the file could not be read or parsed, an error will be returned.
    pub fn from_file<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let is_json = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            self.from_json(path)
        } else {
            self.from_yaml(path)
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `scribe`, any environment variable starting with `SCRIBE_` would be matched, and `SCRIBE_URL` would
    /// set the `url` field.
    ///
    /// The prefix is case-insensitive.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        // `Env` is not `Send`, so snapshot its values.
        let values = Env::prefixed(&prefix).data()?;
        if let Some(default_dict) = values.get(&figment::Profile::Default) {
            self.providers
                .push(BoxedProvider(Box::new(Serialized::defaults(default_dict.clone()))));
        }
        self.env_prefix = Some(prefix);
        Ok(self)
    }

    /// Consumes the configuration loader, deserializing it as `T`.
    ///
    /// ## Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<'a, T>(self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        let figment = self
            .providers
            .into_iter()
            .fold(Figment::new(), |figment, provider| figment.admerge(provider));

        figment
            .extract()
            .map_err(|e| from_figment_error(self.env_prefix.as_deref(), e))
    }
}

fn from_figment_error(env_prefix: Option<&str>, e: figment::Error) -> ConfigurationError {
    match e.kind {
        Kind::MissingField(field) => {
            let help_text = match env_prefix {
                Some(prefix) => format!("Try setting `{}` or `{}{}`.", field, prefix, field.to_uppercase()),
                None => format!("Try setting `{}`.", field),
            };

            ConfigurationError::MissingField { help_text, field }
        }
        Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
            field: e.path.join("."),
            expected_ty,
            actual_ty: actual_ty.to_string(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}
