use std::path::Path;

use figment::{
    providers::{Data, Format, Json, Yaml},
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// A provider whose data is read and parsed once, up front.
///
/// Parsing eagerly means a malformed file fails at load time instead of at extraction time.
pub struct ResolvedProvider {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl ResolvedProvider {
    pub fn from_yaml<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_file::<Yaml>(path.as_ref(), "YAML file")
    }

    pub fn from_json<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_file::<Json>(path.as_ref(), "JSON file")
    }

    fn from_file<F: Format>(path: &Path, name: &'static str) -> Result<Self, Error> {
        let file_data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let data = Data::<F>::string(&file_data).data()?;

        Ok(Self {
            data,
            metadata: Metadata::from(name, path),
        })
    }
}

impl Provider for ResolvedProvider {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}
