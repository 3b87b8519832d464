// Wire shapes the UI surfaces depend on. Field names and omissions here must
// not change.

use autorefresh_core::Timer;
use autorefresh_scheduler::{ControlMessage, ControlResponse, RefreshRejection};
use serde_json::json;

#[test]
fn add_timer_message_decodes_camel_case_timer() {
    let raw = json!({
        "type": "addTimer",
        "timer": {
            "tabId": 12,
            "interval": 45,
            "title": "Queue",
            "icon": "https://example.com/favicon.ico",
            "paused": false,
            "nextTriggerTime": 1_700_000_045_000_i64,
            "remaining": 0,
            "maxRuns": 3,
            "runCount": 1
        }
    });
    let ControlMessage::AddTimer { timer: Some(timer) } = ControlMessage::from_value(raw).unwrap()
    else {
        panic!("expected addTimer with a timer");
    };
    assert_eq!(timer.tab_id, 12);
    assert_eq!(timer.max_runs, Some(3));
    assert_eq!(timer.run_count, 1);
}

#[test]
fn tab_messages_use_tab_id_key() {
    for (kind, expected) in [
        ("removeTimer", ControlMessage::RemoveTimer { tab_id: 4 }),
        ("refreshOnce", ControlMessage::RefreshOnce { tab_id: 4 }),
        ("togglePauseTimer", ControlMessage::TogglePauseTimer { tab_id: 4 }),
    ] {
        let msg = ControlMessage::from_value(json!({"type": kind, "tabId": 4})).unwrap();
        assert_eq!(msg, expected);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": kind, "tabId": 4})
        );
    }
}

#[test]
fn bulk_messages_are_type_only() {
    assert_eq!(
        serde_json::to_value(ControlMessage::ResumeAllTimers).unwrap(),
        json!({"type": "resumeAllTimers"})
    );
}

#[test]
fn plain_success_has_no_optional_fields() {
    assert_eq!(
        serde_json::to_value(ControlResponse::ok()).unwrap(),
        json!({"success": true})
    );
}

#[test]
fn refresh_once_replies() {
    assert_eq!(
        serde_json::to_value(ControlResponse::rejected(RefreshRejection::NotFound)).unwrap(),
        json!({"success": false, "message": "notFound"})
    );
    assert_eq!(
        serde_json::to_value(ControlResponse::rejected(RefreshRejection::MaxRunsReached))
            .unwrap(),
        json!({"success": false, "message": "maxRunsReached"})
    );
    assert_eq!(
        serde_json::to_value(ControlResponse::refreshed(false)).unwrap(),
        json!({"success": true, "stopped": false})
    );
    assert_eq!(
        serde_json::to_value(ControlResponse::failed()).unwrap(),
        json!({"success": false})
    );
}

#[test]
fn toggle_and_unknown_replies() {
    assert_eq!(
        serde_json::to_value(ControlResponse::toggled(Some(true))).unwrap(),
        json!({"success": true, "paused": true})
    );
    assert_eq!(
        serde_json::to_value(ControlResponse::unknown()).unwrap(),
        json!({"success": false, "msg": "未知消息类型"})
    );
}

#[test]
fn stored_timer_omits_absent_cap() {
    let value = serde_json::to_value(Timer::new(1, 60)).unwrap();
    assert!(value.get("maxRuns").is_none());
    assert_eq!(value["runCount"], 0);
    assert_eq!(value["nextTriggerTime"], 0);
}
