//! Static catalog: device definitions and questionnaires that every study
//! run references by id.

pub mod devices;
pub mod questionnaires;

pub use devices::{instantiate, metric_id, DeviceInstance, DeviceModel, PartSpec};
pub use questionnaires::{display_item, questionnaire_url, Instrument};

use crate::error::Result;
use crate::fhir::{Record, Resource};

/// Every catalog resource, part definitions before the definitions that list them.
pub fn static_records() -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for model in DeviceModel::ALL {
        records.extend(model.definitions()?.into_iter().map(Resource::into_record));
    }
    records.extend(
        Instrument::ALL
            .iter()
            .map(|instrument| instrument.questionnaire().into_record()),
    );
    Ok(records)
}
