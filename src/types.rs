use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

//==============================================================================
// Education Levels
//==============================================================================

/// Education level a capacity figure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Inicial,
    Primaria,
    Secundaria,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Inicial, Level::Primaria, Level::Secundaria];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Inicial => "inicial",
            Level::Primaria => "primaria",
            Level::Secundaria => "secundaria",
        }
    }

    /// Flat field name carrying this level's occupancy (`aforo_inicial`)
    pub fn aforo_field(&self) -> String {
        format!("aforo_{}", self.as_str())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inicial" => Ok(Level::Inicial),
            "primaria" => Ok(Level::Primaria),
            "secundaria" => Ok(Level::Secundaria),
            other => Err(EngineError::InvalidInput(format!("Unknown level '{}'", other))),
        }
    }
}

//==============================================================================
// Input Records
//==============================================================================

/// Lenient numeric view of a JSON value
///
/// Numbers and numeric strings count; `null`, booleans, empty strings,
/// objects and non-finite values do not.
pub fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
        _ => None,
    }
}

fn lenient_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(&value))
}

/// Named input fields as submitted by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputRecord(BTreeMap<String, Value>);

impl InputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The field's value when it is present and finite-numeric
    pub fn numeric(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(lenient_number)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for InputRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One room-type row of a level: `rooms × occupancy`, each needing `area_per_person` m²
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRow {
    #[serde(default, deserialize_with = "lenient_opt")]
    pub room_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub occupancy_per_room: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub area_per_person: Option<f64>,
}

impl RoomRow {
    pub fn new(room_count: f64, occupancy_per_room: f64, area_per_person: f64) -> Self {
        Self {
            room_count: Some(room_count),
            occupancy_per_room: Some(occupancy_per_room),
            area_per_person: Some(area_per_person),
        }
    }
}

/// Capacity of one education level
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelCapacity {
    pub aforo: Option<f64>,
    pub rooms: Vec<RoomRow>,
}

impl<'de> Deserialize<'de> for LevelCapacity {
    /// Accepts either `{"aforo": 90, "rooms": [...]}` or a bare figure (`90`)
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Full {
            #[serde(default, deserialize_with = "lenient_opt")]
            aforo: Option<f64>,
            #[serde(default)]
            rooms: Vec<RoomRow>,
        }

        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(_) => {
                let full: Full = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
                Ok(LevelCapacity {
                    aforo: full.aforo,
                    rooms: full.rooms,
                })
            }
            other => Ok(LevelCapacity {
                aforo: lenient_number(&other),
                rooms: Vec::new(),
            }),
        }
    }
}

/// Per-level capacity figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inicial: Option<LevelCapacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primaria: Option<LevelCapacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secundaria: Option<LevelCapacity>,
}

impl CapacityRecord {
    /// Occupancy-only record, as read from an uploaded template
    pub fn from_aforos(inicial: f64, primaria: f64, secundaria: f64) -> Self {
        let level = |aforo| {
            Some(LevelCapacity {
                aforo: Some(aforo),
                rooms: Vec::new(),
            })
        };
        Self {
            inicial: level(inicial),
            primaria: level(primaria),
            secundaria: level(secundaria),
        }
    }

    pub fn level(&self, level: Level) -> Option<&LevelCapacity> {
        match level {
            Level::Inicial => self.inicial.as_ref(),
            Level::Primaria => self.primaria.as_ref(),
            Level::Secundaria => self.secundaria.as_ref(),
        }
    }

    fn level_mut(&mut self, level: Level) -> &mut Option<LevelCapacity> {
        match level {
            Level::Inicial => &mut self.inicial,
            Level::Primaria => &mut self.primaria,
            Level::Secundaria => &mut self.secundaria,
        }
    }
}

//==============================================================================
// Calculation Request
//==============================================================================

/// Everything the orchestrator may write for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationRequest {
    /// Flat named fields, written through the profile's mapping sets
    pub fields: InputRecord,
    /// Room-type rows per level, written into the profile's level ranges
    pub rooms: BTreeMap<Level, Vec<RoomRow>>,
}

impl CalculationRequest {
    /// Build a request from a JSON body
    ///
    /// Keys named after a level (`inicial`, ...) are read as capacity
    /// records; every other key is a flat field.
    pub fn from_json(body: Value) -> EngineResult<Self> {
        let object = match body {
            Value::Null => {
                return Err(EngineError::MissingInput("request body is empty".to_string()))
            }
            Value::Object(object) => object,
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "expected a JSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let mut capacity = CapacityRecord::default();
        let mut fields = InputRecord::new();
        for (key, value) in object {
            match key.parse::<Level>() {
                Ok(level) => {
                    let parsed: LevelCapacity = serde_json::from_value(value).map_err(|e| {
                        EngineError::InvalidInput(format!("invalid '{}' record: {}", key, e))
                    })?;
                    *capacity.level_mut(level) = Some(parsed);
                }
                Err(_) => fields.insert(key, value),
            }
        }

        let mut request = CalculationRequest::from(capacity);
        for (key, value) in fields.fields() {
            request.fields.insert(key.clone(), value.clone());
        }
        Ok(request)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.rooms.values().all(|rows| rows.is_empty())
    }
}

impl From<InputRecord> for CalculationRequest {
    fn from(fields: InputRecord) -> Self {
        Self {
            fields,
            rooms: BTreeMap::new(),
        }
    }
}

impl From<CapacityRecord> for CalculationRequest {
    fn from(record: CapacityRecord) -> Self {
        let mut request = CalculationRequest::default();
        for level in Level::ALL {
            if let Some(capacity) = record.level(level) {
                if let Some(aforo) = capacity.aforo {
                    request.fields.insert(level.aforo_field(), aforo);
                }
                if !capacity.rooms.is_empty() {
                    request.rooms.insert(level, capacity.rooms.clone());
                }
            }
        }
        request
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//==============================================================================
// Calculation Results
//==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    pub aforo: f64,
    pub aulas: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    pub aforo_maximo: f64,
    pub area_parcial: f64,
    pub area_total: f64,
    pub aulas: f64,
    pub circulacion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassroomMeasurements {
    pub modulo_largo: f64,
    pub modulo_ancho: f64,
    pub area_modulo: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionInfo {
    pub pisos: f64,
    pub area_techada: f64,
    pub area_libre: f64,
}

/// Students per toilet, by sex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToiletRatio {
    pub ninos: f64,
    pub ninas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToiletsPerStudent {
    pub inicial: ToiletRatio,
    pub primaria: ToiletRatio,
    pub secundaria: ToiletRatio,
}

/// Stair parameters in centimetres (riser, tread) and metres (width)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stairs {
    pub contrapaso: f64,
    pub paso: f64,
    pub ancho: f64,
}

/// One row of a label-driven extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub cantidad: f64,
    pub m2_total: f64,
    pub label: String,
}

/// Label-derived keys are only known once the workbook is read
pub type LabeledResults = BTreeMap<String, LabeledRow>;

/// Which source produced a level's classroom count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AulasSource {
    Spreadsheet,
    Native,
}

/// Spreadsheet classroom count compared with the native aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCheck {
    pub level: Level,
    pub rows: String,
    pub spreadsheet: Option<f64>,
    pub native: f64,
    pub consistent: bool,
    pub source: AulasSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalculationResult {
    pub profile: String,
    pub updated_cells: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub levels: BTreeMap<Level, LevelResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<ResultData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classroom_measurements: Option<ClassroomMeasurements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub construction_info: Option<ConstructionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toilets_per_student: Option<ToiletsPerStudent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stairs: Option<Stairs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_results: Option<LabeledResults>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aggregate_checks: Vec<AggregateCheck>,
}

//==============================================================================
// Cost Reports
//==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureCosts {
    pub costo_directo: f64,
    pub gastos_generales: f64,
    pub utilidad: f64,
    pub subtotal: f64,
    pub igv: f64,
    pub presupuesto_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentCosts {
    pub presupuesto_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub infraestructura: InfrastructureCosts,
    pub equipamiento: EquipmentCosts,
    pub total_general: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_number() {
        assert_eq!(lenient_number(&json!(3)), Some(3.0));
        assert_eq!(lenient_number(&json!(2.5)), Some(2.5));
        assert_eq!(lenient_number(&json!("12")), Some(12.0));
        assert_eq!(lenient_number(&json!(" 7 ")), Some(7.0));
        assert_eq!(lenient_number(&json!("")), None);
        assert_eq!(lenient_number(&json!("abc")), None);
        assert_eq!(lenient_number(&json!("NaN")), None);
        assert_eq!(lenient_number(&json!("inf")), None);
        assert_eq!(lenient_number(&json!(null)), None);
        assert_eq!(lenient_number(&json!(true)), None);
        assert_eq!(lenient_number(&json!([1])), None);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("Primaria".parse::<Level>().unwrap(), Level::Primaria);
        assert!("universidad".parse::<Level>().is_err());
        assert_eq!(Level::Secundaria.aforo_field(), "aforo_secundaria");
    }

    #[test]
    fn test_level_capacity_accepts_bare_number() {
        let capacity: LevelCapacity = serde_json::from_value(json!(90)).unwrap();
        assert_eq!(capacity.aforo, Some(90.0));
        assert!(capacity.rooms.is_empty());
    }

    #[test]
    fn test_level_capacity_full_record() {
        let capacity: LevelCapacity = serde_json::from_value(json!({
            "aforo": "120",
            "rooms": [
                {"room_count": 2, "occupancy_per_room": 30, "area_per_person": 1.5},
                {"room_count": "x"}
            ]
        }))
        .unwrap();
        assert_eq!(capacity.aforo, Some(120.0));
        assert_eq!(capacity.rooms[0], RoomRow::new(2.0, 30.0, 1.5));
        assert_eq!(capacity.rooms[1], RoomRow::default());
    }

    #[test]
    fn test_request_from_flat_fields() {
        let request = CalculationRequest::from_json(json!({
            "aulas_primaria": 12,
            "biblioteca": null
        }))
        .unwrap();
        assert_eq!(request.fields.numeric("aulas_primaria"), Some(12.0));
        assert_eq!(request.fields.numeric("biblioteca"), None);
        assert!(request.rooms.is_empty());
    }

    #[test]
    fn test_request_from_capacity_record() {
        let request = CalculationRequest::from_json(json!({
            "inicial": 90,
            "primaria": {
                "aforo": 180,
                "rooms": [{"room_count": 2, "occupancy_per_room": 30, "area_per_person": 1.5}]
            },
            "secundaria": {"aforo": null}
        }))
        .unwrap();
        assert_eq!(request.fields.numeric("aforo_inicial"), Some(90.0));
        assert_eq!(request.fields.numeric("aforo_primaria"), Some(180.0));
        assert_eq!(request.fields.numeric("aforo_secundaria"), None);
        assert_eq!(request.rooms[&Level::Primaria].len(), 1);
    }

    #[test]
    fn test_request_rejects_null_and_non_objects() {
        assert!(matches!(
            CalculationRequest::from_json(Value::Null),
            Err(EngineError::MissingInput(_))
        ));
        assert!(matches!(
            CalculationRequest::from_json(json!([1, 2])),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_capacity_from_aforos() {
        let request = CalculationRequest::from(CapacityRecord::from_aforos(90.0, 180.0, 150.0));
        assert_eq!(request.fields.len(), 3);
        assert_eq!(request.fields.numeric("aforo_secundaria"), Some(150.0));
    }

    #[test]
    fn test_result_skips_empty_sections() {
        let result = CalculationResult {
            profile: "matriz-basic".to_string(),
            updated_cells: 3,
            result_data: Some(ResultData::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("levels").is_none());
        assert!(json.get("stairs").is_none());
        assert!(json.get("aggregate_checks").is_none());
        assert_eq!(json["result_data"]["aforo_maximo"], json!(0.0));
    }
}
