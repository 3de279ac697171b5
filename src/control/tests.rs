use super::*;
use crate::message::{Message, START_ENGINE_ID, STOP_ENGINE_ID};
use std::time::Instant;
use tokio::time::timeout;

fn test_channel() -> ControlChannel {
    ControlChannel::new(&ControlConfig {
        send_timeout_millis: 50,
        queue_capacity: 16,
        ..ControlConfig::default()
    })
}

/// Collect everything currently queued for one connection
async fn drain(outbound: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(Some(msg)) = timeout(Duration::from_millis(20), outbound.recv()).await {
        out.push(msg);
    }
    out
}

fn control_state(msgs: &[Message], element_id: &str) -> Option<String> {
    msgs.iter()
        .find(|m| m.kind() == Some("htmlControl") && m.id() == Some(element_id))
        .and_then(|m| m.sub_kind().map(str::to_string))
}

fn status_infos(msgs: &[Message]) -> Vec<&Message> {
    msgs.iter()
        .filter(|m| m.kind() == Some("status") && m.sub_kind() == Some("info"))
        .collect()
}

fn engine_control(sub_kind: &str) -> Message {
    Message::new("engineControl").with_sub_kind(sub_kind)
}

#[test]
fn test_engine_starts_running() {
    let state = EngineState::new();
    assert!(state.is_running());

    assert!(state.set_running(false));
    assert!(!state.is_running());
}

#[tokio::test]
async fn test_start_sets_running_and_emits_pair() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;
    channel.engine.set_running(false);

    channel.dispatch(engine_control("start")).await.unwrap();
    assert!(channel.is_running());

    let out = drain(&mut outbound).await;
    let controls: Vec<_> = out.iter().filter(|m| m.kind() == Some("htmlControl")).collect();
    assert_eq!(controls.len(), 2);
    assert_eq!(control_state(&out, START_ENGINE_ID).as_deref(), Some("disable"));
    assert_eq!(control_state(&out, STOP_ENGINE_ID).as_deref(), Some("enable"));

    let infos = status_infos(&out);
    assert_eq!(infos.len(), 1);
    assert!(infos[0].text().unwrap().contains("start"));
}

#[tokio::test]
async fn test_stop_clears_running_and_emits_inverse_pair() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;

    channel.dispatch(engine_control("stop")).await.unwrap();
    assert!(!channel.is_running());

    let out = drain(&mut outbound).await;
    assert_eq!(control_state(&out, START_ENGINE_ID).as_deref(), Some("enable"));
    assert_eq!(control_state(&out, STOP_ENGINE_ID).as_deref(), Some("disable"));
    assert_eq!(status_infos(&out).len(), 1);
}

#[tokio::test]
async fn test_unknown_engine_control_acts_as_stop() {
    for msg in [engine_control("reboot"), Message::new("engineControl")] {
        let channel = test_channel();
        let mut outbound = channel.subscribe().await;

        channel.dispatch(msg).await.unwrap();
        assert!(!channel.is_running());

        let out = drain(&mut outbound).await;
        assert_eq!(control_state(&out, START_ENGINE_ID).as_deref(), Some("enable"));
        assert_eq!(control_state(&out, STOP_ENGINE_ID).as_deref(), Some("disable"));
    }
}

#[tokio::test]
async fn test_status_ready_reflects_current_state() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;
    let ready = Message::new("status").with_sub_kind("ready");

    channel.dispatch(ready.clone()).await.unwrap();
    let running_pair = drain(&mut outbound).await;
    assert_eq!(running_pair.len(), 2);
    assert_eq!(control_state(&running_pair, START_ENGINE_ID).as_deref(), Some("disable"));
    assert_eq!(control_state(&running_pair, STOP_ENGINE_ID).as_deref(), Some("enable"));

    channel.engine.set_running(false);
    channel.dispatch(ready).await.unwrap();
    let stopped_pair = drain(&mut outbound).await;
    assert_eq!(stopped_pair.len(), 2);
    assert_eq!(control_state(&stopped_pair, START_ENGINE_ID).as_deref(), Some("enable"));
    assert_eq!(control_state(&stopped_pair, STOP_ENGINE_ID).as_deref(), Some("disable"));
}

#[tokio::test]
async fn test_status_ready_is_idempotent() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;
    let ready = Message::new("status").with_sub_kind("ready");

    channel.dispatch(ready.clone()).await.unwrap();
    let first = drain(&mut outbound).await;
    channel.dispatch(ready).await.unwrap();
    let second = drain(&mut outbound).await;

    assert_eq!(first, second);
    assert!(channel.is_running());
}

#[tokio::test]
async fn test_status_gone_and_unknown_are_silent() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;

    channel
        .dispatch(Message::new("status").with_sub_kind("gone"))
        .await
        .unwrap();
    channel
        .dispatch(Message::new("status").with_sub_kind("whatever"))
        .await
        .unwrap();
    channel.dispatch(Message::new("teleport")).await.unwrap();

    assert!(drain(&mut outbound).await.is_empty());
    assert!(channel.is_running());
}

#[tokio::test]
async fn test_form_submit_echoes_both_fields() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;

    channel
        .dispatch(Message::new("formSubmit").with_text("regionA|agentB"))
        .await
        .unwrap();

    let out = drain(&mut outbound).await;
    assert_eq!(out.len(), 1);
    let infos = status_infos(&out);
    assert_eq!(infos.len(), 1);
    let text = infos[0].text().unwrap();
    assert!(text.contains("regionA"));
    assert!(text.contains("agentB"));
}

#[tokio::test]
async fn test_form_submit_without_text_uses_nil_ids() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;

    channel.dispatch(Message::new("formSubmit")).await.unwrap();

    let out = drain(&mut outbound).await;
    let nil = "00000000-0000-0000-0000-000000000000";
    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0].text(),
        Some(format!("Received '{}|{}'<br />", nil, nil).as_str())
    );
}

#[tokio::test]
async fn test_malformed_form_submit_is_rejected() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;

    for text in ["onlyone", "a|b|c", ""] {
        let result = channel
            .dispatch(Message::new("formSubmit").with_text(text))
            .await;
        assert_eq!(
            result,
            Err(DispatchError::MalformedFormSubmit {
                text: text.to_string()
            })
        );
    }

    assert!(drain(&mut outbound).await.is_empty());
    assert!(channel.is_running());
}

#[test]
fn test_form_submission_allows_empty_fields() {
    let form = FormSubmission::parse(Some("|agent")).unwrap();
    assert_eq!(form.destination, "");
    assert_eq!(form.agent, "agent");
}

#[tokio::test]
async fn test_publish_times_out_when_not_drained() {
    let channel = ControlChannel::new(&ControlConfig {
        send_timeout_millis: 100,
        queue_capacity: 1,
        ..ControlConfig::default()
    });

    // Fill the single slot; the connection never drains it
    let _outbound = channel.subscribe().await;
    channel.publish(Message::new("status")).await.unwrap();

    let started = Instant::now();
    let result = channel.publish(Message::new("status")).await;
    let elapsed = started.elapsed();

    assert_eq!(result, Err(ControlError::Timeout(Duration::from_millis(100))));
    assert!(elapsed >= Duration::from_millis(90));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn test_dispatch_survives_undrained_outbound_queue() {
    let channel = ControlChannel::new(&ControlConfig {
        send_timeout_millis: 30,
        queue_capacity: 1,
        ..ControlConfig::default()
    });
    let _outbound = channel.subscribe().await;

    let result = timeout(
        Duration::from_secs(2),
        channel.dispatch(engine_control("stop")),
    )
    .await;

    // Emissions were dropped but the state change still happened
    assert!(matches!(result, Ok(Ok(()))));
    assert!(!channel.is_running());
}

#[tokio::test]
async fn test_outbound_preserves_send_order() {
    let channel = test_channel();
    let mut outbound = channel.subscribe().await;

    for i in 0..5 {
        channel
            .publish(Message::status_info(i.to_string()))
            .await
            .unwrap();
    }

    let texts: Vec<String> = drain(&mut outbound)
        .await
        .iter()
        .filter_map(|m| m.text().map(str::to_string))
        .collect();
    assert_eq!(texts, vec!["0", "1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_dispatcher_serializes_inbound_messages() {
    let channel = Arc::new(test_channel());
    let mut outbound = channel.subscribe().await;

    let dispatcher = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.run_dispatcher().await })
    };

    channel.submit(engine_control("stop")).await.unwrap();
    channel.submit(engine_control("start")).await.unwrap();
    channel.submit(engine_control("stop")).await.unwrap();

    // Three control pairs plus three status infos
    let mut out = Vec::new();
    while out.len() < 9 {
        let msg = timeout(Duration::from_secs(2), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        out.push(msg);
    }

    assert!(!channel.is_running());
    let infos: Vec<_> = status_infos(&out)
        .iter()
        .filter_map(|m| m.text())
        .map(str::to_string)
        .collect();
    assert_eq!(
        infos,
        vec!["Engine stop<br />", "Engine start<br />", "Engine stop<br />"]
    );

    dispatcher.abort();
}

#[tokio::test]
async fn test_publish_without_connection_drops_at_once() {
    let channel = test_channel();

    let started = Instant::now();
    let result = channel.publish(Message::status_info("nobody")).await;

    assert_eq!(result, Err(ControlError::NoConnection));
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn test_closed_connection_is_forgotten() {
    let channel = test_channel();
    let outbound = channel.subscribe().await;
    drop(outbound);

    let result = channel.publish(Message::status_info("gone")).await;
    assert_eq!(result, Err(ControlError::NoConnection));

    // A later connection only sees what is published after it subscribed
    let mut outbound = channel.subscribe().await;
    channel.publish(Message::status_info("fresh")).await.unwrap();
    let out = drain(&mut outbound).await;
    assert_eq!(out, vec![Message::status_info("fresh")]);
}

#[tokio::test]
async fn test_each_connection_gets_the_whole_pair_in_order() {
    let channel = Arc::new(test_channel());
    let mut first = channel.subscribe().await;
    let mut second = channel.subscribe().await;

    channel
        .dispatch(Message::new("status").with_sub_kind("ready"))
        .await
        .unwrap();

    for outbound in [&mut first, &mut second] {
        let out = drain(outbound).await;
        let ids: Vec<_> = out.iter().filter_map(|m| m.id()).collect();
        assert_eq!(ids, vec![START_ENGINE_ID, STOP_ENGINE_ID]);
        assert_eq!(out[0].sub_kind(), Some("disable"));
        assert_eq!(out[1].sub_kind(), Some("enable"));
    }
}

#[tokio::test]
async fn test_stalled_connection_does_not_starve_others() {
    let channel = ControlChannel::new(&ControlConfig {
        send_timeout_millis: 50,
        queue_capacity: 1,
        ..ControlConfig::default()
    });
    let _stalled = channel.subscribe().await;
    let mut live = channel.subscribe().await;

    channel.publish(Message::status_info("one")).await.unwrap();
    assert_eq!(live.recv().await, Some(Message::status_info("one")));

    // The stalled queue is full now; the live one still gets the message
    let result = channel.publish(Message::status_info("two")).await;
    assert_eq!(result, Err(ControlError::Timeout(Duration::from_millis(50))));
    assert_eq!(live.recv().await, Some(Message::status_info("two")));
}

#[test]
fn test_heartbeat_follows_engine_flag() {
    let state = Arc::new(EngineState::new());
    let mut engine_loop = EngineLoop::new(Arc::clone(&state), &ControlConfig::default());

    assert_eq!(engine_loop.step(), Heartbeat::Active('|'));
    assert_eq!(engine_loop.step(), Heartbeat::Active('/'));

    state.set_running(false);
    assert_eq!(engine_loop.step(), Heartbeat::Paused('Z'));
    assert_eq!(engine_loop.step(), Heartbeat::Paused('ℤ'));

    // New cycle starts from the first frame
    assert_eq!(engine_loop.step(), Heartbeat::Paused('𝔷'));
}

#[tokio::test]
async fn test_engine_loop_survives_zero_sub_tick() {
    let state = Arc::new(EngineState::new());
    let engine_loop = EngineLoop::new(
        Arc::clone(&state),
        &ControlConfig {
            sub_tick_millis: 0,
            ..ControlConfig::default()
        },
    );

    let task = tokio::spawn(engine_loop.run());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!task.is_finished());
    task.abort();
}
