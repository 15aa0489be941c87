//! End-to-end task supervisor exercise at the public crate surface: two
//! tasks register against overlapping resources, one runs to
//! completion, a pending one is stopped before it starts, and resource
//! conflicts are visible across the supervisor the whole time.

use docdb_pipeline::copy_paste::{ResourceDescriptor, TaskState, TaskSupervisor};

#[tokio::test]
async fn concurrent_tasks_conflict_until_one_completes() {
    let supervisor = TaskSupervisor::new();

    let (copy_task, _copy_cancel) = supervisor
        .register(vec![ResourceDescriptor::collection("cluster-a", "sales", "orders")])
        .await;

    let candidate = ResourceDescriptor::database("cluster-a", "sales");
    let conflicts = supervisor.find_conflicting_tasks(&candidate).await;
    assert_eq!(conflicts, vec![copy_task.id()]);

    let (second_task, second_cancel) = supervisor
        .register(vec![ResourceDescriptor::cluster("cluster-b")])
        .await;
    assert_eq!(second_task.status().state, TaskState::Pending);
    second_task.stop();
    assert_eq!(second_task.status().state, TaskState::Pending);
    assert!(second_cancel.is_cancelled());

    supervisor.remove(copy_task.id()).await;
    let conflicts_after_removal = supervisor.find_conflicting_tasks(&candidate).await;
    assert!(conflicts_after_removal.is_empty());
}
