//! # Address Space Collaborator
//!
//! The engine does not own the node model. It consumes it through the
//! [`AddressSpace`] trait:
//!
//! | Call | Used by |
//! |------|---------|
//! | [`find_node`](AddressSpace::find_node) | monitored item creation (validation, deadband range) |
//! | [`read_value`](AddressSpace::read_value) | every sample of a data item |
//! | [`evaluate_filter`](AddressSpace::evaluate_filter) | every event offered to an event item |
//!
//! Calls are made from the engine task and must not block for long.
//!
//! [`MemoryAddressSpace`] is a small in-memory implementation for tests and
//! embedding. Values written with [`MemoryAddressSpace::write_value`] are
//! picked up at the next sampling instant of each item monitoring the node.

use std::cmp::Ordering;

use dashmap::DashMap;

use crate::status::StatusCode;
use crate::types::{
    AttributeId, ContentFilterElement, DataType, DataValue, EventData, EventFilter,
    FilterOperand, FilterOperator, NodeId, Variant,
};

/// Engineering unit range of an analog variable, used by percent deadbands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EuRange {
    pub low: f64,
    pub high: f64,
}

impl EuRange {
    pub fn span(&self) -> f64 {
        (self.high - self.low).abs()
    }
}

/// What the engine needs to know about a node before monitoring it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub browse_name: String,
    /// Value type of a variable; `None` for objects.
    pub data_type: Option<DataType>,
    /// Only analog variables carry one.
    pub eu_range: Option<EuRange>,
    /// The node emits events (objects with the `SubscribeToEvents` bit).
    pub event_notifier: bool,
}

impl NodeInfo {
    pub fn is_variable(&self) -> bool {
        self.data_type.is_some()
    }
}

/// Node model consumed by the engine.
pub trait AddressSpace: Send + Sync + 'static {
    /// Look a node up. `None` makes monitored item creation fail with
    /// `BadNodeIdUnknown`.
    fn find_node(&self, node_id: &NodeId) -> Option<NodeInfo>;

    /// Read an attribute. Failures are reported through the status of the
    /// returned value, never as a panic or error.
    fn read_value(&self, node_id: &NodeId, attribute_id: AttributeId) -> DataValue;

    /// Decide whether an event passes the where clause of `filter`.
    ///
    /// The default implementation evaluates the simple operators of
    /// [`evaluate_where_clause`].
    fn evaluate_filter(&self, event: &EventData, filter: &EventFilter) -> bool {
        evaluate_where_clause(event, &filter.where_clause)
    }
}

// ============================================================================
// IN-MEMORY ADDRESS SPACE
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    info: NodeInfo,
    value: DataValue,
}

/// In-memory [`AddressSpace`].
///
/// Starts with the `Server` object (`i=2253`) as event notifier.
#[derive(Debug)]
pub struct MemoryAddressSpace {
    nodes: DashMap<NodeId, Node>,
}

impl Default for MemoryAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAddressSpace {
    pub fn new() -> Self {
        let space = Self {
            nodes: DashMap::new(),
        };
        space.add_object(NodeId::SERVER, "Server", true);
        space
    }

    /// Add a variable whose data type is taken from its initial value.
    ///
    /// An `Empty` initial value declares a `BaseDataType` variable.
    pub fn add_variable(&self, node_id: NodeId, browse_name: impl Into<String>, value: DataValue) {
        let data_type = value.value.data_type().unwrap_or(DataType::Variant);
        self.add_variable_of_type(node_id, browse_name, data_type, value);
    }

    pub fn add_variable_of_type(
        &self,
        node_id: NodeId,
        browse_name: impl Into<String>,
        data_type: DataType,
        value: DataValue,
    ) {
        let info = NodeInfo {
            node_id: node_id.clone(),
            browse_name: browse_name.into(),
            data_type: Some(data_type),
            eu_range: None,
            event_notifier: false,
        };
        self.nodes.insert(node_id, Node { info, value });
    }

    /// Add an analog variable with an engineering unit range.
    pub fn add_analog_variable(
        &self,
        node_id: NodeId,
        browse_name: impl Into<String>,
        value: DataValue,
        eu_range: EuRange,
    ) {
        self.add_variable(node_id.clone(), browse_name, value);
        if let Some(mut node) = self.nodes.get_mut(&node_id) {
            node.info.eu_range = Some(eu_range);
        }
    }

    pub fn add_object(&self, node_id: NodeId, browse_name: impl Into<String>, event_notifier: bool) {
        let info = NodeInfo {
            node_id: node_id.clone(),
            browse_name: browse_name.into(),
            data_type: None,
            eu_range: None,
            event_notifier,
        };
        let value = DataValue::from_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID);
        self.nodes.insert(node_id, Node { info, value });
    }

    /// Replace the value of a variable. Returns `false` if the node is unknown
    /// or not a variable.
    pub fn write_value(&self, node_id: &NodeId, value: DataValue) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(mut node) if node.info.is_variable() => {
                node.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn remove_node(&self, node_id: &NodeId) -> bool {
        self.nodes.remove(node_id).is_some()
    }
}

impl AddressSpace for MemoryAddressSpace {
    fn find_node(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.nodes.get(node_id).map(|node| node.info.clone())
    }

    fn read_value(&self, node_id: &NodeId, attribute_id: AttributeId) -> DataValue {
        let Some(node) = self.nodes.get(node_id) else {
            return DataValue::from_status(StatusCode::BAD_NODE_ID_UNKNOWN);
        };
        let value = match attribute_id {
            AttributeId::Value if node.info.is_variable() => return node.value.clone(),
            AttributeId::NodeId => Variant::NodeId(Box::new(node.info.node_id.clone())),
            AttributeId::BrowseName | AttributeId::DisplayName => {
                Variant::String(node.info.browse_name.clone())
            }
            AttributeId::EventNotifier if !node.info.is_variable() => {
                Variant::Byte(u8::from(node.info.event_notifier))
            }
            _ => return DataValue::from_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
        };
        DataValue {
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }
}

// ============================================================================
// WHERE CLAUSE EVALUATION
// ============================================================================

/// Evaluate a where clause against an event.
///
/// Element 0 is the root. An empty clause accepts every event. Unknown
/// element references and type mismatches evaluate to `false`, and a clause
/// whose elements reference each other in a cycle rejects every event.
pub fn evaluate_where_clause(event: &EventData, elements: &[ContentFilterElement]) -> bool {
    if elements.is_empty() {
        return true;
    }
    let mut clause = WhereClause {
        event,
        elements,
        results: vec![Slot::Pending; elements.len()],
        cyclic: false,
    };
    let accepted = matches!(clause.element(0), Variant::Boolean(true));
    accepted && !clause.cyclic
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Pending,
    Visiting,
    Done(bool),
}

/// One evaluation pass. Each element is evaluated at most once, so shared
/// sub-elements cost nothing extra.
struct WhereClause<'a> {
    event: &'a EventData,
    elements: &'a [ContentFilterElement],
    results: Vec<Slot>,
    cyclic: bool,
}

impl<'a> WhereClause<'a> {
    fn element(&mut self, index: usize) -> Variant {
        let elements = self.elements;
        let (Some(element), Some(slot)) = (elements.get(index), self.results.get(index).copied()) else {
            return Variant::Empty;
        };
        match slot {
            Slot::Done(result) => return Variant::Boolean(result),
            Slot::Visiting => {
                self.cyclic = true;
                return Variant::Empty;
            }
            Slot::Pending => {}
        }
        self.set(index, Slot::Visiting);
        let result = self.apply(element);
        self.set(index, Slot::Done(result));
        Variant::Boolean(result)
    }

    fn set(&mut self, index: usize, slot: Slot) {
        if let Some(entry) = self.results.get_mut(index) {
            *entry = slot;
        }
    }

    fn operand(&mut self, element: &'a ContentFilterElement, i: usize) -> Variant {
        match element.operands.get(i) {
            Some(FilterOperand::Literal(value)) => value.clone(),
            Some(FilterOperand::Attribute(attr)) => self.event.field(attr),
            Some(FilterOperand::Element(next)) => self.element(*next as usize),
            None => Variant::Empty,
        }
    }

    fn compare_operands(&mut self, element: &'a ContentFilterElement) -> Option<Ordering> {
        let left = self.operand(element, 0);
        let right = self.operand(element, 1);
        compare(&left, &right)
    }

    fn apply(&mut self, element: &'a ContentFilterElement) -> bool {
        let truthy = |v: Variant| matches!(v, Variant::Boolean(true));
        match element.operator {
            FilterOperator::Equals => self.compare_operands(element) == Some(Ordering::Equal),
            FilterOperator::IsNull => self.operand(element, 0) == Variant::Empty,
            FilterOperator::GreaterThan => self.compare_operands(element) == Some(Ordering::Greater),
            FilterOperator::LessThan => self.compare_operands(element) == Some(Ordering::Less),
            FilterOperator::GreaterThanOrEqual => matches!(
                self.compare_operands(element),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::LessThanOrEqual => matches!(
                self.compare_operands(element),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Not => !truthy(self.operand(element, 0)),
            FilterOperator::And => truthy(self.operand(element, 0)) && truthy(self.operand(element, 1)),
            FilterOperator::Or => truthy(self.operand(element, 0)) || truthy(self.operand(element, 1)),
            FilterOperator::OfType => match self.operand(element, 0) {
                Variant::NodeId(type_id) => *type_id == self.event.event_type,
                _ => false,
            },
        }
    }
}

fn compare(a: &Variant, b: &Variant) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Variant::String(x), Variant::String(y)) => Some(x.cmp(y)),
        (Variant::Boolean(x), Variant::Boolean(y)) => Some(x.cmp(y)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}
