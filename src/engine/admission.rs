use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub const DEFAULT_GAP_MINUTES: i64 = 180;
pub const DEFAULT_MAX_DAYS_AHEAD: i64 = 2;

/// Syntaxes accepted for the raw arrival time, tried in order.
/// A bare date is handled separately and means midnight.
const ARRIVAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Booking policy: minimum separation per table and the booking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub gap: TimeDelta,
    pub max_ahead: TimeDelta,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_MINUTES, DEFAULT_MAX_DAYS_AHEAD)
    }
}

impl Policy {
    /// Non-positive or unrepresentable values fall back to the defaults.
    pub fn new(gap_minutes: i64, max_days_ahead: i64) -> Self {
        let positive = |d: &TimeDelta| *d > TimeDelta::zero();
        Self {
            gap: TimeDelta::try_minutes(gap_minutes)
                .filter(positive)
                .unwrap_or_else(|| TimeDelta::minutes(DEFAULT_GAP_MINUTES)),
            max_ahead: TimeDelta::try_days(max_days_ahead)
                .filter(positive)
                .unwrap_or_else(|| TimeDelta::days(DEFAULT_MAX_DAYS_AHEAD)),
        }
    }

    /// Latest arrival time bookable at `now` (inclusive). `None` when the
    /// window reaches past the representable calendar.
    pub fn latest_arrival(&self, now: Timestamp) -> Option<Timestamp> {
        now.checked_add_signed(self.max_ahead)
    }
}

/// Why a request was turned away. Each maps to one user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoTable,
    NameRequired,
    ContactRequired,
    InvalidTime,
    InPast,
    TooFarAhead,
    Conflict { existing: Timestamp },
}

impl Rejection {
    /// Stable machine-readable code (metrics label, logs).
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NoTable => "no_table",
            Rejection::NameRequired => "name_required",
            Rejection::ContactRequired => "contact_required",
            Rejection::InvalidTime => "invalid_time",
            Rejection::InPast => "in_past",
            Rejection::TooFarAhead => "too_far_ahead",
            Rejection::Conflict { .. } => "conflict",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoTable => write!(f, "no table selected"),
            Rejection::NameRequired => write!(f, "name required"),
            Rejection::ContactRequired => {
                write!(f, "contact required: provide a phone number or an email address")
            }
            Rejection::InvalidTime => write!(f, "invalid date/time"),
            Rejection::InPast => write!(f, "time must be in the future"),
            Rejection::TooFarAhead => write!(f, "too far ahead"),
            Rejection::Conflict { existing } => write!(
                f,
                "conflicts with existing booking at {} within the gap window",
                format_timestamp(existing)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(NewReservation),
    Rejected(Rejection),
}

pub fn now_local() -> Timestamp {
    Local::now().naive_local()
}

pub fn parse_arrival_time(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    for fmt in ARRIVAL_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Strictly closer than `gap`. Exactly `gap` apart does not conflict.
pub fn within_gap(a: Timestamp, b: Timestamp, gap: TimeDelta) -> bool {
    (a - b).abs() < gap
}

/// Size guards on raw input, checked before admission.
pub(crate) fn validate_request_limits(request: &ReservationRequest) -> Result<(), EngineError> {
    if request.table_id.len() > MAX_TABLE_ID_LEN {
        return Err(EngineError::LimitExceeded("table id too long"));
    }
    if request.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    if request.phone.len() > MAX_CONTACT_LEN || request.email.len() > MAX_CONTACT_LEN {
        return Err(EngineError::LimitExceeded("contact too long"));
    }
    if request.arrival_time.len() > MAX_ARRIVAL_TIME_LEN {
        return Err(EngineError::LimitExceeded("arrival time too long"));
    }
    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Checks that need no stored bookings: table, name, contact, time syntax
/// and the booking window. First failing check wins.
pub fn precheck(
    candidate: &ReservationRequest,
    now: Timestamp,
    policy: &Policy,
) -> Result<NewReservation, Rejection> {
    let table_id = candidate.table_id.trim();
    if table_id.is_empty() {
        return Err(Rejection::NoTable);
    }
    let name = candidate.name.trim();
    if name.is_empty() {
        return Err(Rejection::NameRequired);
    }
    let phone = non_empty(&candidate.phone);
    let email = non_empty(&candidate.email);
    if phone.is_none() && email.is_none() {
        return Err(Rejection::ContactRequired);
    }
    let Some(arrival_time) = parse_arrival_time(&candidate.arrival_time) else {
        return Err(Rejection::InvalidTime);
    };
    if arrival_time < now {
        return Err(Rejection::InPast);
    }
    if policy
        .latest_arrival(now)
        .is_some_and(|latest| arrival_time > latest)
    {
        return Err(Rejection::TooFarAhead);
    }

    Ok(NewReservation {
        table_id: table_id.to_string(),
        name: name.to_string(),
        phone,
        email,
        arrival_time,
    })
}

/// First booking on the table strictly within `gap` of `arrival_time`.
pub fn first_conflict(
    existing_for_table: &[Timestamp],
    arrival_time: Timestamp,
    gap: TimeDelta,
) -> Option<Timestamp> {
    existing_for_table
        .iter()
        .copied()
        .find(|&t| within_gap(t, arrival_time, gap))
}

/// Decide whether `candidate` may be booked given the arrival times already
/// on its table. First failing check wins. Pure: no I/O, no clock reads.
pub fn evaluate(
    candidate: &ReservationRequest,
    existing_for_table: &[Timestamp],
    now: Timestamp,
    policy: &Policy,
) -> Admission {
    let record = match precheck(candidate, now, policy) {
        Ok(record) => record,
        Err(rejection) => return Admission::Rejected(rejection),
    };
    match first_conflict(existing_for_table, record.arrival_time, policy.gap) {
        Some(existing) => Admission::Rejected(Rejection::Conflict { existing }),
        None => Admission::Accepted(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, h: u32, m: u32, s: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn now() -> Timestamp {
        at(1, 10, 0, 0)
    }

    fn request(table: &str, time: &str) -> ReservationRequest {
        ReservationRequest {
            table_id: table.into(),
            name: "Ada".into(),
            phone: "555-0100".into(),
            email: String::new(),
            arrival_time: time.into(),
        }
    }

    fn decide(req: &ReservationRequest, existing: &[Timestamp]) -> Admission {
        evaluate(req, existing, now(), &Policy::default())
    }

    fn rejection(req: &ReservationRequest, existing: &[Timestamp]) -> Option<Rejection> {
        match decide(req, existing) {
            Admission::Rejected(r) => Some(r),
            Admission::Accepted(_) => None,
        }
    }

    // ── Parsing ───────────────────────────────────────────

    #[test]
    fn parses_common_iso_shapes() {
        let noon = at(1, 12, 0, 0);
        assert_eq!(parse_arrival_time("2024-01-01T12:00"), Some(noon));
        assert_eq!(parse_arrival_time("2024-01-01T12:00:00"), Some(noon));
        assert_eq!(parse_arrival_time("2024-01-01 12:00"), Some(noon));
        assert_eq!(parse_arrival_time(" 2024-01-01 12:00:00 "), Some(noon));
        assert_eq!(parse_arrival_time("2024-01-01"), Some(at(1, 0, 0, 0)));
        assert_eq!(
            parse_arrival_time("2024-01-01T12:00:30.250"),
            Some(at(1, 12, 0, 30) + TimeDelta::milliseconds(250))
        );
    }

    #[test]
    fn rejects_garbage_times() {
        assert_eq!(parse_arrival_time(""), None);
        assert_eq!(parse_arrival_time("tomorrow"), None);
        assert_eq!(parse_arrival_time("2024-02-30T12:00"), None);
        assert_eq!(parse_arrival_time("2024-01-01T25:00"), None);
    }

    // ── Validation order ──────────────────────────────────

    #[test]
    fn missing_table_wins_over_everything() {
        let req = ReservationRequest {
            table_id: "   ".into(),
            ..Default::default()
        };
        assert_eq!(rejection(&req, &[]), Some(Rejection::NoTable));
    }

    #[test]
    fn blank_name_rejected() {
        let mut req = request("5", "2024-01-01T12:00");
        req.name = " \t ".into();
        assert_eq!(rejection(&req, &[]), Some(Rejection::NameRequired));
    }

    #[test]
    fn contact_required_regardless_of_other_fields() {
        let mut req = request("5", "2024-01-01T12:00");
        req.phone = "  ".into();
        req.email = String::new();
        assert_eq!(rejection(&req, &[]), Some(Rejection::ContactRequired));

        // Still wins over a bad time and a conflict.
        req.arrival_time = "not a time".into();
        assert_eq!(rejection(&req, &[at(1, 12, 0, 0)]), Some(Rejection::ContactRequired));
    }

    #[test]
    fn email_alone_is_enough_contact() {
        let mut req = request("5", "2024-01-01T12:00");
        req.phone = String::new();
        req.email = "ada@example.com".into();
        assert!(matches!(decide(&req, &[]), Admission::Accepted(_)));
    }

    #[test]
    fn unparsable_time_rejected() {
        let req = request("5", "2024-13-01T12:00");
        assert_eq!(rejection(&req, &[]), Some(Rejection::InvalidTime));
    }

    // ── Booking window ────────────────────────────────────

    #[test]
    fn window_lower_bound_is_inclusive() {
        assert_eq!(rejection(&request("5", "2024-01-01T10:00:00"), &[]), None);
        assert_eq!(
            rejection(&request("5", "2024-01-01T09:59:59"), &[]),
            Some(Rejection::InPast)
        );
    }

    #[test]
    fn window_upper_bound_is_inclusive() {
        assert_eq!(rejection(&request("5", "2024-01-03T10:00:00"), &[]), None);
        assert_eq!(
            rejection(&request("5", "2024-01-03T10:00:01"), &[]),
            Some(Rejection::TooFarAhead)
        );
    }

    #[test]
    fn window_follows_policy() {
        let policy = Policy::new(DEFAULT_GAP_MINUTES, 7);
        let req = request("5", "2024-01-06T10:00");
        assert!(matches!(evaluate(&req, &[], now(), &policy), Admission::Accepted(_)));
    }

    #[test]
    fn huge_window_has_no_upper_bound() {
        let policy = Policy::new(DEFAULT_GAP_MINUTES, i64::MAX);
        assert_eq!(policy.max_ahead, TimeDelta::days(DEFAULT_MAX_DAYS_AHEAD));

        // In range for TimeDelta but past the end of the calendar.
        let policy = Policy::new(DEFAULT_GAP_MINUTES, 1_000_000_000);
        assert_eq!(policy.latest_arrival(now()), None);
        let req = request("5", "9999-12-31T23:59");
        assert!(matches!(evaluate(&req, &[], now(), &policy), Admission::Accepted(_)));
    }

    #[test]
    fn non_positive_policy_values_use_defaults() {
        assert_eq!(Policy::new(-180, 0), Policy::default());
        assert_eq!(Policy::new(0, -2), Policy::default());
    }

    // ── Gap rule ──────────────────────────────────────────

    #[test]
    fn gap_scenario_from_booking_at_noon() {
        let existing = [at(1, 12, 0, 0)];
        assert_eq!(
            rejection(&request("5", "2024-01-01T14:59"), &existing),
            Some(Rejection::Conflict { existing: at(1, 12, 0, 0) })
        );
        assert_eq!(rejection(&request("5", "2024-01-01T15:00"), &existing), None);
    }

    #[test]
    fn gap_is_symmetric() {
        let existing = [at(1, 16, 0, 0)];
        assert!(rejection(&request("5", "2024-01-01T13:00:01"), &existing).is_some());
        assert_eq!(rejection(&request("5", "2024-01-01T13:00"), &existing), None);
    }

    #[test]
    fn same_instant_conflicts() {
        let existing = [at(1, 12, 0, 0)];
        assert!(matches!(
            rejection(&request("5", "2024-01-01T12:00"), &existing),
            Some(Rejection::Conflict { .. })
        ));
    }

    #[test]
    fn any_conflicting_booking_rejects() {
        let existing = [at(1, 10, 0, 0), at(1, 13, 0, 0), at(1, 19, 0, 0)];
        // 16:00 is exactly 3h from 13:00 and 19:00.
        assert_eq!(rejection(&request("5", "2024-01-01T16:00"), &existing), None);
        assert_eq!(
            rejection(&request("5", "2024-01-01T17:00"), &existing),
            Some(Rejection::Conflict { existing: at(1, 19, 0, 0) })
        );
    }

    #[test]
    fn empty_table_accepts_any_in_window_time() {
        for time in ["2024-01-01T10:00", "2024-01-02T03:15", "2024-01-03T10:00"] {
            assert_eq!(rejection(&request("5", time), &[]), None, "{time}");
        }
    }

    #[test]
    fn custom_gap_respected() {
        let policy = Policy::new(90, DEFAULT_MAX_DAYS_AHEAD);
        let existing = [at(1, 12, 0, 0)];
        let ok = evaluate(&request("5", "2024-01-01T13:30"), &existing, now(), &policy);
        let clash = evaluate(&request("5", "2024-01-01T13:29"), &existing, now(), &policy);
        assert!(matches!(ok, Admission::Accepted(_)));
        assert!(matches!(clash, Admission::Rejected(Rejection::Conflict { .. })));
    }

    #[test]
    fn precheck_skips_the_gap() {
        let req = request("5", "2024-01-01T12:00");
        let record = precheck(&req, now(), &Policy::default()).unwrap();
        assert_eq!(record.arrival_time, at(1, 12, 0, 0));
        assert_eq!(
            first_conflict(&[at(1, 13, 0, 0)], record.arrival_time, Policy::default().gap),
            Some(at(1, 13, 0, 0))
        );
        assert_eq!(
            precheck(&request("5", "soon"), now(), &Policy::default()),
            Err(Rejection::InvalidTime)
        );
    }

    // ── Normalization ─────────────────────────────────────

    #[test]
    fn accepted_record_is_trimmed() {
        let req = ReservationRequest {
            table_id: " 5 ".into(),
            name: "  Ada Lovelace ".into(),
            phone: "   ".into(),
            email: " ada@example.com ".into(),
            arrival_time: " 2024-01-01T12:00 ".into(),
        };
        match decide(&req, &[]) {
            Admission::Accepted(record) => {
                assert_eq!(record.table_id, "5");
                assert_eq!(record.name, "Ada Lovelace");
                assert_eq!(record.phone, None);
                assert_eq!(record.email.as_deref(), Some("ada@example.com"));
                assert_eq!(record.arrival_time, at(1, 12, 0, 0));
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[test]
    fn limits_reject_oversized_input() {
        let mut req = request("5", "2024-01-01T12:00");
        req.name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_request_limits(&req),
            Err(EngineError::LimitExceeded("name too long"))
        ));
        assert!(validate_request_limits(&request("5", "2024-01-01T12:00")).is_ok());
    }

    #[test]
    fn rejection_codes_are_distinct() {
        let all = [
            Rejection::NoTable,
            Rejection::NameRequired,
            Rejection::ContactRequired,
            Rejection::InvalidTime,
            Rejection::InPast,
            Rejection::TooFarAhead,
            Rejection::Conflict { existing: now() },
        ];
        let mut codes: Vec<_> = all.iter().map(Rejection::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
