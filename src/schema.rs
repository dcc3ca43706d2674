use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const BROWSER_PLATFORM: &str = "browser";

// =====================================================
// PLAN
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Search,
    Browse,
    Automate,
    Answer,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Browse => "browse",
            Self::Automate => "automate",
            Self::Answer => "answer",
        }
    }

    /// Unknown strings route like a plain browser search.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "browse" => Self::Browse,
            "automate" => Self::Automate,
            "answer" => Self::Answer,
            _ => Self::Search,
        }
    }
}

/// One branch per operation, each holding only what it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Search,
    Browse { url: Option<String> },
    Automate { steps: Vec<Action> },
    Answer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub operation: Operation,
    pub target_platform: String,
    pub context: String,
}

impl Plan {
    /// `{search, browser, [], query}`: used whenever the planner output is unusable.
    pub fn fallback(query: &str) -> Self {
        Self {
            operation: Operation::Search,
            target_platform: BROWSER_PLATFORM.to_string(),
            context: query.to_string(),
        }
    }

    pub fn operation_type(&self) -> OperationType {
        match self.operation {
            Operation::Search => OperationType::Search,
            Operation::Browse { .. } => OperationType::Browse,
            Operation::Automate { .. } => OperationType::Automate,
            Operation::Answer => OperationType::Answer,
        }
    }

    pub fn is_browser_platform(&self) -> bool {
        let platform = self.target_platform.trim();
        platform.is_empty() || platform.eq_ignore_ascii_case(BROWSER_PLATFORM)
    }

    pub fn from_wire(wire: PlanWire) -> Self {
        let op_type = OperationType::parse_lenient(&wire.operation_type);
        let mut target_platform = wire.target_platform.trim().to_string();
        if target_platform.is_empty() {
            target_platform = BROWSER_PLATFORM.to_string();
        }
        let operation = match op_type {
            OperationType::Search => Operation::Search,
            OperationType::Browse => Operation::Browse {
                url: wire.url.filter(|u| !u.trim().is_empty()),
            },
            OperationType::Automate => Operation::Automate {
                steps: wire.steps.into_iter().filter_map(Action::from_value).collect(),
            },
            OperationType::Answer => Operation::Answer,
        };
        // An unrecognised operation string is a browser search, not a platform search.
        if op_type == OperationType::Search
            && !wire.operation_type.trim().eq_ignore_ascii_case("search")
        {
            target_platform = BROWSER_PLATFORM.to_string();
        }
        Self {
            operation,
            target_platform,
            context: wire.context,
        }
    }

    pub fn to_wire(&self) -> PlanWire {
        let (steps, url) = match &self.operation {
            Operation::Automate { steps } => (steps.iter().map(|a| a.to_value()).collect(), None),
            Operation::Browse { url } => (Vec::new(), url.clone()),
            _ => (Vec::new(), None),
        };
        PlanWire {
            operation_type: self.operation_type().as_str().to_string(),
            target_platform: self.target_platform.clone(),
            steps,
            context: self.context.clone(),
            url,
        }
    }
}

/// Plan exactly as it travels as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWire {
    #[serde(default, deserialize_with = "null_as_default")]
    pub operation_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_platform: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Models often emit `null` for fields they have nothing to say about.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =====================================================
// ACTION
// =====================================================

/// A single step object: `{"action": tag, ...params}`. Kept as a JSON map so
/// unknown fields survive the trip to the action service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Map<String, Value>);

impl Action {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn new(tag: &str) -> Self {
        let mut map = Map::new();
        map.insert("action".to_string(), Value::String(tag.to_string()));
        Self(map)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn tag(&self) -> &str {
        self.0.get("action").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

// =====================================================
// EXECUTION RESULT
// =====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub title: String,
    pub href: String,
    pub body: String,
}

impl EvidenceItem {
    pub fn new(title: impl Into<String>, href: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSource {
    Preferred,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub evidence: Vec<EvidenceItem>,
    pub operation_type: OperationType,
    pub target_platform: String,
    pub steps_executed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ExecutionSource>,
}

impl ExecutionResult {
    pub fn for_plan(plan: &Plan) -> Self {
        Self {
            success: false,
            evidence: Vec::new(),
            operation_type: plan.operation_type(),
            target_platform: plan.target_platform.clone(),
            steps_executed: 0,
            error: None,
            source: None,
        }
    }

    pub fn failed(plan: &Plan, error: impl Into<String>) -> Self {
        let mut result = Self::for_plan(plan);
        result.error = Some(error.into());
        result
    }

    pub fn tagged(mut self, source: ExecutionSource) -> Self {
        self.source = Some(source);
        self
    }
}
