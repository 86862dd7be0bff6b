//! Integration tests for posted receives and `wait_some` over the in-process link.

use std::time::Duration;

use taskfarm_core::{Task, TaskResult};
use taskfarm_wire::{cluster, Directive, FrameCodec, Report, WireError, WorkerId};

fn leaf(checksum: u64) -> Report {
    let task = Task::seeds(&Default::default()).unwrap().remove(0);
    Report::completed(&task, TaskResult { depth: 0, checksum }, Vec::new())
}

#[tokio::test]
async fn wait_some_returns_every_ready_completion() {
    let (mut coord, mut ends) = cluster(3, FrameCodec::for_batch(2));
    let handles: Vec<_> = (0..3)
        .map(|w| coord.recv_async(WorkerId(w)).unwrap())
        .collect();

    ends[0].report(&leaf(10)).await.unwrap();
    ends[2].report(&leaf(12)).await.unwrap();

    let done = coord.wait_some(&handles).await.unwrap();
    let mut sources: Vec<_> = done.iter().map(|c| c.source).collect();
    sources.sort();
    assert_eq!(sources, vec![WorkerId(0), WorkerId(2)]);
    assert_eq!(coord.posted_len(), 1);
    assert_eq!(coord.posted_for(WorkerId(1)), Some(handles[1]));
}

#[tokio::test]
async fn wait_some_blocks_until_a_frame_arrives() {
    let (mut coord, mut ends) = cluster(1, FrameCodec::for_batch(1));
    let handle = coord.recv_async(WorkerId(0)).unwrap();
    let mut worker = ends.remove(0);

    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.report(&leaf(1)).await.unwrap();
        worker
    });

    let done = coord.wait_some(&[handle]).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].handle, handle);
    late.await.unwrap();
}

#[tokio::test]
async fn frame_arriving_before_its_receive_is_kept() {
    let (mut coord, mut ends) = cluster(1, FrameCodec::for_batch(1));
    ends[0].report(&leaf(7)).await.unwrap();

    let handle = coord.recv_async(WorkerId(0)).unwrap();
    let done = coord.wait_some(&[handle]).await.unwrap();
    let report: Report = coord.codec().decode(&done[0].frame).unwrap();
    assert_eq!(report, leaf(7));
}

#[tokio::test]
async fn only_awaited_handles_complete() {
    let (mut coord, mut ends) = cluster(2, FrameCodec::for_batch(1));
    let first = coord.recv_async(WorkerId(0)).unwrap();
    let second = coord.recv_async(WorkerId(1)).unwrap();
    ends[0].report(&leaf(1)).await.unwrap();
    ends[1].report(&leaf(2)).await.unwrap();

    let done = coord.wait_some(&[second]).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].source, WorkerId(1));

    // Worker 0's frame stays buffered for its still-posted receive.
    let done = coord.wait_some(&[first]).await.unwrap();
    assert_eq!(done[0].source, WorkerId(0));
}

#[tokio::test]
async fn second_receive_for_a_source_is_a_violation() {
    let (mut coord, _ends) = cluster(1, FrameCodec::for_batch(1));
    coord.recv_async(WorkerId(0)).unwrap();
    assert!(matches!(
        coord.recv_async(WorkerId(0)),
        Err(WireError::ProtocolViolation(_))
    ));
    assert!(matches!(
        coord.recv_async(WorkerId(5)),
        Err(WireError::ProtocolViolation(_))
    ));
}

#[tokio::test]
async fn cancelled_receive_cannot_be_awaited() {
    let (mut coord, _ends) = cluster(1, FrameCodec::for_batch(1));
    let handle = coord.recv_async(WorkerId(0)).unwrap();
    assert!(coord.cancel(handle));
    assert!(!coord.cancel(handle));
    assert!(matches!(
        coord.wait_some(&[handle]).await,
        Err(WireError::ProtocolViolation(_))
    ));
    // The source is free for a fresh receive.
    coord.recv_async(WorkerId(0)).unwrap();
}

#[tokio::test]
async fn empty_wait_returns_immediately() {
    let (mut coord, _ends) = cluster(2, FrameCodec::for_batch(1));
    assert!(coord.wait_some(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn all_workers_gone_is_a_transport_error() {
    let (mut coord, ends) = cluster(2, FrameCodec::for_batch(1));
    let handle = coord.recv_async(WorkerId(0)).unwrap();
    drop(ends);
    assert!(matches!(
        coord.wait_some(&[handle]).await,
        Err(WireError::Transport(_))
    ));
}

#[tokio::test]
async fn broadcast_reaches_every_worker() {
    let (coord, mut ends) = cluster(3, FrameCodec::for_batch(1));
    let sends = coord.broadcast(&Directive::Terminate).unwrap();
    assert_eq!(sends.len(), 3);
    for send in sends {
        send.wait().await.unwrap();
    }
    for end in &mut ends {
        assert_eq!(end.next_directive().await.unwrap(), Directive::Terminate);
    }
}

#[tokio::test]
async fn assignment_survives_the_trip() {
    let (coord, mut ends) = cluster(1, FrameCodec::for_batch(4));
    let task = Task::seeds(&Default::default()).unwrap().remove(0);
    let mut send = coord
        .send_async(WorkerId(0), &Directive::Assignment(task.clone()))
        .unwrap();
    assert!(send.is_complete());
    assert_eq!(
        ends[0].next_directive().await.unwrap(),
        Directive::Assignment(task)
    );
}
