//! Dataset loaders.
//!
//! Each supported study gets a [`DatasetLoader`] that knows its file layout,
//! its devices and how its labels are encoded. The helpers here cover what
//! the loaders have in common.

pub mod sdn;
pub mod srad;
pub mod wesad;
pub mod wspcp;

pub use sdn::SdnLoader;
pub use srad::SradLoader;
pub use wesad::WesadLoader;
pub use wspcp::WspcpLoader;

use crate::catalog::{instantiate, DeviceInstance, DeviceModel, Instrument};
use crate::core::Participant;
use crate::error::{IngestError, Result};
use crate::fhir::{BodyStructure, CodeableConcept, IncludedStructure, Reference, Resource};
use crate::pipeline::{device_association, DeviceRegistration, DatasetLoader, StudyContext};
use crate::reader::SignalSeries;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The supported studies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Wesad,
    Sdn,
    Srad,
    Wspcp,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [Dataset::Wesad, Dataset::Sdn, Dataset::Srad, Dataset::Wspcp];

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Wesad => "WESAD",
            Dataset::Sdn => "SDN",
            Dataset::Srad => "SRAD",
            Dataset::Wspcp => "WSPCP",
        }
    }

    /// Open the dataset rooted at `dir`.
    pub fn loader(&self, dir: &Path) -> Result<Box<dyn DatasetLoader>> {
        if !dir.is_dir() {
            return Err(IngestError::Dataset(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(match self {
            Dataset::Wesad => Box::new(WesadLoader::new(dir)),
            Dataset::Sdn => Box::new(SdnLoader::new(dir)?),
            Dataset::Srad => Box::new(SradLoader::new(dir)),
            Dataset::Wspcp => Box::new(WspcpLoader::new(dir)),
        })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown dataset '{s}', expected one of WESAD, SDN, SRAD, WSPCP")
            })
    }
}

/// Names of the subdirectories of `dir`, `S2` before `S10`.
pub(crate) fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort_by_key(|name| natural_key(name));
    Ok(names)
}

fn natural_key(name: &str) -> (String, u64, String) {
    let prefix: String = name.chars().take_while(|c| !c.is_ascii_digit()).collect();
    let rest = &name[prefix.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let number = digits.parse().unwrap_or(0);
    (prefix, number, rest[digits.len()..].to_string())
}

/// `{study}-{participant}-{key}` body site of a participant.
pub(crate) fn body_structure(
    study: &str,
    participant: &Participant,
    key: &str,
    code: &str,
    description: &str,
) -> BodyStructure {
    BodyStructure {
        id: Some(format!("{study}-{}-{key}", participant.raw_id)),
        patient: participant.reference.clone(),
        included_structure: vec![IncludedStructure {
            structure: CodeableConcept::code(code),
        }],
        description: Some(description.to_string()),
    }
}

/// Link to the body structure whose id ends in `-{key}`.
pub(crate) fn structure_reference(structures: &[BodyStructure], key: &str) -> Result<Reference> {
    let suffix = format!("-{key}");
    let structure = structures
        .iter()
        .find(|s| s.id.as_deref().is_some_and(|id| id.ends_with(&suffix)))
        .ok_or_else(|| IngestError::Dataset(format!("no body structure for {key}")))?;
    Reference::to(structure)
}

/// One device per model, each worn at the body site named by its key.
pub(crate) fn worn_devices(
    study: &str,
    participant: &Participant,
    structures: &[BodyStructure],
    worn: &[(DeviceModel, &str)],
) -> Result<DeviceRegistration> {
    let mut registration = DeviceRegistration::default();
    for (model, site) in worn {
        let instance = instantiate(*model, &model.device_id(study, &participant.raw_id))?;
        registration.associations.push(device_association(
            participant,
            Reference::to(&instance.device)?,
            Some(structure_reference(structures, site)?),
        ));
        registration.instances.push(instance);
    }
    Ok(registration)
}

/// Upload the device definitions and questionnaires a dataset links to.
pub(crate) fn upload_catalog(
    ctx: &mut StudyContext<'_>,
    models: &[DeviceModel],
    instruments: &[Instrument],
) -> Result<()> {
    for model in models {
        for definition in model.definitions()? {
            ctx.create_record(&definition.into_record())?;
        }
    }
    for instrument in instruments {
        ctx.create_record(&instrument.questionnaire().into_record())?;
    }
    Ok(())
}

/// Encode and upload one device channel slice, filing it under the device.
///
/// The channel's metric is looked up by `key`; channels the model does not
/// know are uploaded without a device link.
pub(crate) fn upload_device_slice(
    ctx: &mut StudyContext<'_>,
    participant: &Participant,
    device: &DeviceInstance,
    key: &str,
    series: &SignalSeries,
    code: CodeableConcept,
) -> Result<Reference> {
    let metric = device.metric_reference(key);
    if metric.is_none() {
        tracing::warn!(device = device.id(), channel = key, "channel has no device metric");
    }
    let tag = format!("{}-{key}", device.model.spec().id_infix);
    let mut observation = ctx
        .encoder
        .signal_observation(participant, code, series, metric, Some(&tag));
    let reference = ctx.create(&mut observation)?;
    ctx.registry
        .entry(&participant.raw_id)
        .add_device_observation(device.id(), reference.clone());
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dataset_names_parse() {
        assert_eq!("wesad".parse::<Dataset>(), Ok(Dataset::Wesad));
        assert_eq!(" SDN ".parse::<Dataset>(), Ok(Dataset::Sdn));
        assert!("mimic".parse::<Dataset>().is_err());
        assert_eq!(Dataset::Wspcp.to_string(), "WSPCP");
    }

    #[test]
    fn test_subdirectories_sorted_naturally() {
        let dir = TempDir::new().unwrap();
        for name in ["S10", "S2", "S3", ".cache"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("readme.pdf"), b"").unwrap();
        assert_eq!(subdirectories(dir.path()).unwrap(), vec!["S2", "S3", "S10"]);
    }

    #[test]
    fn test_structure_reference_by_suffix() {
        let participant = Participant::new("SRAD", "drive01");
        let structures = vec![
            body_structure("SRAD", &participant, "left-hand", "left hand", "Left Hand"),
            body_structure("SRAD", &participant, "chest", "chest", "Chest"),
        ];
        assert_eq!(
            structure_reference(&structures, "chest").unwrap().reference,
            "BodyStructure/SRAD-drive01-chest"
        );
        assert!(structure_reference(&structures, "left-foot").is_err());
    }

    #[test]
    fn test_loader_requires_directory() {
        let err = Dataset::Srad
            .loader(Path::new("/nonexistent/srad"))
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Dataset(_)));
    }
}
