use super::event::TelemetryEvent;

/// Per-session event filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientFilter {
    pub vehicle_code: Option<String>,
    pub sensor_code: Option<String>,
    pub sensor_type: Option<String>,
}

impl ClientFilter {
    /// Blank strings are treated as unset.
    pub fn new(
        vehicle_code: Option<String>,
        sensor_code: Option<String>,
        sensor_type: Option<String>,
    ) -> Self {
        Self {
            vehicle_code: non_blank(vehicle_code),
            sensor_code: non_blank(sensor_code),
            sensor_type: non_blank(sensor_type),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicle_code.is_none() && self.sensor_code.is_none() && self.sensor_type.is_none()
    }

    /// Every set field must equal the event's value; an event without that
    /// attribute (e.g. a sensor code on a battery update) does not match.
    pub fn matches(&self, event: &TelemetryEvent) -> bool {
        field_matches(&self.vehicle_code, Some(event.vehicle_code()))
            && field_matches(&self.sensor_code, event.sensor_code())
            && field_matches(&self.sensor_type, event.sensor_type())
    }
}

/// Partial filter change sent by a dashboard.
///
/// `None` leaves the field as it is; `Some(None)` or a blank string clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    pub vehicle_code: Option<Option<String>>,
    pub sensor_code: Option<Option<String>>,
    pub sensor_type: Option<Option<String>>,
}

impl ClientFilter {
    pub fn apply(&mut self, update: FilterUpdate) {
        apply_field(&mut self.vehicle_code, update.vehicle_code);
        apply_field(&mut self.sensor_code, update.sensor_code);
        apply_field(&mut self.sensor_type, update.sensor_type);
    }
}

fn apply_field(field: &mut Option<String>, change: Option<Option<String>>) {
    if let Some(value) = change {
        *field = non_blank(value);
    }
}

fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(w) => actual == Some(w.as_str()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
