//! Monitoring filter validation and data-change detection.

use crate::address_space::{EuRange, NodeInfo};
use crate::status::StatusCode;
use crate::types::{
    AttributeId, DataChangeFilter, DataChangeTrigger, DataValue, DeadbandType, EventFilter,
    MonitoringFilter, Variant,
};

/// Check a filter against the attribute and node it is applied to.
pub(crate) fn validate_filter(
    filter: &MonitoringFilter,
    attribute_id: AttributeId,
    node: &NodeInfo,
) -> Result<(), StatusCode> {
    match filter {
        MonitoringFilter::None => Ok(()),
        MonitoringFilter::DataChange(_) if attribute_id == AttributeId::EventNotifier => {
            Err(StatusCode::BAD_FILTER_NOT_ALLOWED)
        }
        MonitoringFilter::DataChange(filter) => validate_data_change_filter(filter, attribute_id, node),
        MonitoringFilter::Event(_) if attribute_id != AttributeId::EventNotifier => {
            Err(StatusCode::BAD_FILTER_NOT_ALLOWED)
        }
        MonitoringFilter::Event(filter) => validate_event_filter(filter),
    }
}

fn validate_data_change_filter(
    filter: &DataChangeFilter,
    attribute_id: AttributeId,
    node: &NodeInfo,
) -> Result<(), StatusCode> {
    if filter.deadband.is_none() {
        return Ok(());
    }
    if attribute_id != AttributeId::Value {
        return Err(StatusCode::BAD_FILTER_NOT_ALLOWED);
    }
    match node.data_type {
        Some(data_type) if data_type.is_numeric() => {}
        _ => return Err(StatusCode::BAD_FILTER_NOT_ALLOWED),
    }
    match filter.deadband {
        DeadbandType::None => Ok(()),
        DeadbandType::Absolute(value) if value.is_nan() || value < 0.0 => {
            Err(StatusCode::BAD_DEADBAND_FILTER_INVALID)
        }
        DeadbandType::Absolute(_) => Ok(()),
        DeadbandType::Percent(value) if !(0.0..=100.0).contains(&value) => {
            Err(StatusCode::BAD_DEADBAND_FILTER_INVALID)
        }
        DeadbandType::Percent(_) if node.eu_range.is_none() => {
            Err(StatusCode::BAD_MONITORED_ITEM_FILTER_UNSUPPORTED)
        }
        DeadbandType::Percent(_) => Ok(()),
    }
}

fn validate_event_filter(filter: &EventFilter) -> Result<(), StatusCode> {
    if filter.select_clauses.is_empty() {
        return Err(StatusCode::BAD_EVENT_FILTER_INVALID);
    }
    Ok(())
}

/// Decide whether `new` is a reportable change against the last queued value.
///
/// With no previous value the change is always reported.
pub(crate) fn is_data_change(
    filter: &DataChangeFilter,
    eu_range: Option<EuRange>,
    last: Option<&DataValue>,
    new: &DataValue,
) -> bool {
    let Some(last) = last else {
        return true;
    };
    if last.status != new.status {
        return true;
    }
    match filter.trigger {
        DataChangeTrigger::Status => false,
        DataChangeTrigger::StatusValue => value_changed(filter.deadband, eu_range, &last.value, &new.value),
        DataChangeTrigger::StatusValueTimestamp => {
            last.source_timestamp != new.source_timestamp
                || value_changed(filter.deadband, eu_range, &last.value, &new.value)
        }
    }
}

fn value_changed(deadband: DeadbandType, eu_range: Option<EuRange>, last: &Variant, new: &Variant) -> bool {
    let threshold = match deadband {
        DeadbandType::None => return last != new,
        DeadbandType::Absolute(value) => value,
        DeadbandType::Percent(percent) => match eu_range {
            Some(range) => percent / 100.0 * range.span(),
            None => return last != new,
        },
    };
    exceeds_deadband(last, new, threshold)
}

/// Arrays are compared element-wise; a length change always counts.
fn exceeds_deadband(last: &Variant, new: &Variant, threshold: f64) -> bool {
    match (last, new) {
        (Variant::Array(a), Variant::Array(b)) => {
            a.len() != b.len() || a.iter().zip(b).any(|(x, y)| exceeds_deadband(x, y, threshold))
        }
        _ => match (last.as_f64(), new.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() > threshold,
            _ => last != new,
        },
    }
}
