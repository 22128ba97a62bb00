use elbtail_event::{BACKEND_STATUS_CODE, ELB, ELB_STATUS_CODE, Event};

/// Key component used when the backend status code is absent or not an integer.
const MISSING_STATUS: &str = "0";

/// Derives the sampling key of an event.
///
/// The key is built from up to three components joined by `_`, in this order:
///
///  1. The backend status code, or `0` if it is absent or not an integer.
///  2. The load balancer status code, only if present as an integer.
///  3. The load balancer name, only if present as a string.
///
/// Omitted components are skipped entirely, so keys with different components may look alike.
/// For example `200_my-elb` can stem from a missing status code or a missing name.
pub fn sample_key(event: &Event) -> String {
    let mut key = match event.get(BACKEND_STATUS_CODE).and_then(|v| v.as_i64()) {
        Some(status) => status.to_string(),
        None => MISSING_STATUS.to_owned(),
    };

    if let Some(status) = event.get(ELB_STATUS_CODE).and_then(|v| v.as_i64()) {
        key.push('_');
        key.push_str(&status.to_string());
    }

    if let Some(name) = event.get(ELB).and_then(|v| v.as_str()) {
        key.push('_');
        key.push_str(name);
    }

    key
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn event(fields: &[(&str, elbtail_event::Value)]) -> Event {
        let mut event = Event::new(DateTime::UNIX_EPOCH);
        for (name, value) in fields {
            event.insert(*name, value.clone());
        }
        event
    }

    #[test]
    fn test_full_key() {
        let event = event(&[
            (BACKEND_STATUS_CODE, 200.into()),
            (ELB_STATUS_CODE, 502.into()),
            (ELB, "my-elb".into()),
        ]);
        assert_eq!(sample_key(&event), "200_502_my-elb");
    }

    #[test]
    fn test_missing_backend_status() {
        let event = event(&[(ELB_STATUS_CODE, 504.into()), (ELB, "my-elb".into())]);
        assert_eq!(sample_key(&event), "0_504_my-elb");
    }

    #[test]
    fn test_non_numeric_components_are_skipped() {
        let event = event(&[
            (BACKEND_STATUS_CODE, "200".into()),
            (ELB_STATUS_CODE, 200.5.into()),
            (ELB, 7.into()),
        ]);
        assert_eq!(sample_key(&event), "0");
    }

    #[test]
    fn test_ragged_keys_collide() {
        let numeric_name = event(&[(BACKEND_STATUS_CODE, 200.into()), (ELB, "5".into())]);
        let without_name = event(&[(BACKEND_STATUS_CODE, 200.into()), (ELB_STATUS_CODE, 5.into())]);
        assert_eq!(sample_key(&numeric_name), "200_5");
        assert_eq!(sample_key(&without_name), "200_5");
    }

    #[test]
    fn test_empty_event() {
        assert_eq!(sample_key(&event(&[])), "0");
    }
}
