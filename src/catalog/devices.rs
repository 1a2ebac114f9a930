//! Device models, their definitions and per-participant instances.

use crate::error::Result;
use crate::fhir::{
    CodeableConcept, CodeableReference, Device, DeviceDefinition, DeviceMetric, DeviceName,
    DevicePart, DeviceProperty, Quantity, Reference, Resource,
};

/// One sensor channel of a device model.
#[derive(Debug, Clone, Copy)]
pub struct PartSpec {
    /// Suffix of the part's device id, also the lowercase modality name.
    pub key: &'static str,
    pub definition: &'static str,
    pub names: &'static [&'static str],
    pub rate: Option<f64>,
    pub resolution: Option<(f64, &'static str)>,
    pub unit: &'static str,
    pub metric_type: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub definition: &'static str,
    pub model_number: &'static str,
    pub id_infix: &'static str,
    pub parts: &'static [PartSpec],
}

const fn part(
    key: &'static str,
    definition: &'static str,
    names: &'static [&'static str],
    rate: Option<f64>,
    unit: &'static str,
    metric_type: &'static str,
) -> PartSpec {
    PartSpec {
        key,
        definition,
        names,
        rate,
        resolution: None,
        unit,
        metric_type,
    }
}

static EMPATICA_E4: ModelSpec = ModelSpec {
    definition: "EmpaticaE4",
    model_number: "E4",
    id_infix: "E4",
    parts: &[
        PartSpec {
            resolution: Some((1.0 / 64.0, "g")),
            ..part("acc", "EmpaticaE4Accelerometer", &["Accelerometer"], Some(32.0), "g", "accelerometer")
        },
        part("bvp", "EmpaticaE4BVP", &["BVP"], Some(64.0), "ADC Code", "PPG"),
        part("eda", "EmpaticaE4EDA", &["EDA"], Some(4.0), "µS", "Electrodermal Activity"),
        part("temp", "EmpaticaE4Temperature", &["Temperature"], Some(4.0), "°C", "Skin Temperature"),
        part("ibi", "EmpaticaE4IBI", &["Inter-beat Interval"], None, "s", "Inter Beat Interval"),
        part("hr", "EmpaticaE4HR", &["Heart Rate"], Some(1.0), "bpm", "Heart Rate"),
        part("tags", "EmpaticaE4Tags", &["Tags", "Button Presses"], None, "timestamp", "Button Press"),
    ],
};

static RESPIBAN: ModelSpec = ModelSpec {
    definition: "RespiBAN",
    model_number: "Pro",
    id_infix: "RespiBAN",
    parts: &[
        part("acc", "RespiBANAccelerometer", &["Accelerometer"], Some(700.0), "g", "accelerometer"),
        part("resp", "RespiBANPZT", &["Respiration Sensor"], Some(700.0), "%", "Respiration"),
        part("eda", "RespiBANEDA", &["EDA"], Some(700.0), "µS", "Electrodermal Activity"),
        part("temp", "RespiBANTemperature", &["Temperature"], Some(700.0), "°C", "Skin Temperature"),
        part("ecg", "RespiBANECG", &["ECG"], Some(700.0), "mV", "Electrocardiogram"),
        part("emg", "RespiBANEMG", &["EMG"], Some(700.0), "mV", "Electromyography Activity"),
    ],
};

static SRAD_RECORDER: ModelSpec = ModelSpec {
    definition: "SradRecorder",
    model_number: "Srad",
    id_infix: "Recorder",
    parts: &[
        part("ecg", "SradRecorderEKG", &["Electrocardiogram"], Some(15.5), "mV", "Electrocardiogram"),
        part("emg", "SradRecorderEMG", &["Electromyography"], Some(15.5), "mV", "Electromyography Activity"),
        part("resp", "SradRecorderResp", &["Respiration Sensor"], Some(15.5), "%", "Respiration"),
        part("sc-1", "SradRecorderGSR", &["Skin conductivity"], Some(15.5), "µS", "Electrodermal Activity"),
        part("sc-2", "SradRecorderGSR", &["Skin conductivity"], Some(15.5), "µS", "Electrodermal Activity"),
    ],
};

/// Recording hardware used across the supported datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceModel {
    EmpaticaE4,
    RespiBan,
    SradRecorder,
}

impl DeviceModel {
    pub const ALL: [DeviceModel; 3] = [
        DeviceModel::EmpaticaE4,
        DeviceModel::RespiBan,
        DeviceModel::SradRecorder,
    ];

    pub fn spec(&self) -> &'static ModelSpec {
        match self {
            DeviceModel::EmpaticaE4 => &EMPATICA_E4,
            DeviceModel::RespiBan => &RESPIBAN,
            DeviceModel::SradRecorder => &SRAD_RECORDER,
        }
    }

    pub fn part(&self, key: &str) -> Option<&'static PartSpec> {
        self.spec().parts.iter().find(|p| p.key.eq_ignore_ascii_case(key))
    }

    /// Id of a participant's instance of this model, e.g. `WESAD-E4-S2`.
    pub fn device_id(&self, study: &str, participant: &str) -> String {
        format!("{study}-{}-{participant}", self.spec().id_infix)
    }

    /// Part definitions followed by the parent definition that lists them.
    pub fn definitions(&self) -> Result<Vec<DeviceDefinition>> {
        let spec = self.spec();
        let mut definitions: Vec<DeviceDefinition> = Vec::new();
        for part in spec.parts {
            if definitions.iter().any(|d| d.id.as_deref() == Some(part.definition)) {
                continue;
            }
            definitions.push(DeviceDefinition {
                id: Some(part.definition.to_string()),
                device_name: part
                    .names
                    .iter()
                    .map(|name| DeviceName {
                        name: name.to_string(),
                        type_: "user-friendly-name".to_string(),
                    })
                    .collect(),
                ..Default::default()
            });
        }
        let has_part = part_links(&definitions)?;
        definitions.push(DeviceDefinition {
            id: Some(spec.definition.to_string()),
            model_number: Some(spec.model_number.to_string()),
            has_part,
            ..Default::default()
        });
        Ok(definitions)
    }
}

fn part_links(definitions: &[DeviceDefinition]) -> Result<Vec<DevicePart>> {
    definitions
        .iter()
        .map(|d| Reference::to(d).map(|reference| DevicePart { reference }))
        .collect()
}

/// A participant's device with its channel sub-devices and metrics.
#[derive(Debug, Clone)]
pub struct DeviceInstance {
    pub model: DeviceModel,
    pub device: Device,
    pub parts: Vec<Device>,
    pub metrics: Vec<DeviceMetric>,
    id: String,
}

impl DeviceInstance {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Link to the metric of a channel, `None` for channels the model lacks.
    pub fn metric_reference(&self, key: &str) -> Option<Reference> {
        self.model
            .part(key)
            .map(|part| Reference::new(DeviceMetric::TYPE, &metric_id(&self.id, part.key)))
    }

    pub fn part_reference(&self, key: &str) -> Option<Reference> {
        self.model
            .part(key)
            .map(|part| Reference::new(Device::TYPE, &part_device_id(&self.id, part.key)))
    }
}

fn part_device_id(device_id: &str, key: &str) -> String {
    format!("{device_id}-{key}")
}

pub fn metric_id(device_id: &str, key: &str) -> String {
    format!("{device_id}-{key}-dm")
}

fn sampling_property(code: &str, value: f64, unit: &str) -> DeviceProperty {
    DeviceProperty {
        type_: CodeableConcept::code(code),
        value_quantity: Some(Quantity::new(value, unit)),
    }
}

/// Build the device, per-channel devices and metrics for one participant.
pub fn instantiate(model: DeviceModel, device_id: &str) -> Result<DeviceInstance> {
    let spec = model.spec();
    let device = Device {
        id: Some(device_id.to_string()),
        status: Some("active".to_string()),
        definition: Some(CodeableReference::from(Reference::new(
            DeviceDefinition::TYPE,
            spec.definition,
        ))),
        ..Default::default()
    };
    let parent = Reference::to(&device)?;
    let device_id = parent.id().to_string();

    let mut parts = Vec::with_capacity(spec.parts.len());
    let mut metrics = Vec::with_capacity(spec.parts.len());
    for part in spec.parts {
        let mut property = Vec::new();
        if let Some(hz) = part.rate {
            property.push(sampling_property("sampling rate", hz, "Hz"));
        }
        if let Some((value, unit)) = part.resolution {
            property.push(sampling_property("resolution", value, unit));
        }
        let sub_device = Device {
            id: Some(part_device_id(&device_id, part.key)),
            status: Some("active".to_string()),
            definition: Some(CodeableReference::from(Reference::new(
                DeviceDefinition::TYPE,
                part.definition,
            ))),
            parent: Some(parent.clone()),
            property,
        };
        metrics.push(DeviceMetric {
            id: Some(metric_id(&device_id, part.key)),
            device: Reference::to(&sub_device)?,
            category: "measurement".to_string(),
            unit: Some(CodeableConcept::code(part.unit)),
            type_: CodeableConcept::code(part.metric_type),
        });
        parts.push(sub_device);
    }

    Ok(DeviceInstance {
        model,
        device,
        parts,
        metrics,
        id: device_id,
    })
}
