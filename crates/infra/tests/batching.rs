//! End-to-end batching through the request hooks, interceptors, event
//! dispatcher, queue connections and worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use queuebatch_core::{
    Argument, Capability, DispatchOptions, DispatchResult, Dispatcher, Job, Listener,
    ListenerError, ListenerType,
};
use queuebatch_events::{Event, EventDispatcher, ListenerRegistry};
use queuebatch_infra::{
    BatchConfig, BatchContext, BatchRequests, DirectListenerQueue, FlushReport, InMemoryQueue,
    ProcessBatch, QueueManager, QueueWorker, Transport,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CountJob {
    name: &'static str,
    options: DispatchOptions,
    count: Arc<AtomicUsize>,
}

impl CountJob {
    fn new(name: &'static str, count: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            name,
            options: DispatchOptions::default(),
            count: count.clone(),
        })
    }
}

impl Job for CountJob {
    fn name(&self) -> &'static str {
        self.name
    }

    fn options(&self) -> &DispatchOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut DispatchOptions {
        &mut self.options
    }

    fn handle(&mut self) -> Option<DispatchResult<()>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Some(Ok(()))
    }
}

#[derive(Debug)]
struct UserRegistered {
    region: &'static str,
}

impl Event for UserRegistered {
    fn event_type(&self) -> &'static str {
        "users.registered"
    }
}

#[derive(Debug)]
struct PageViewed;

impl Event for PageViewed {
    fn event_type(&self) -> &'static str {
        "pages.viewed"
    }
}

#[derive(Debug)]
struct DraftSaved;

impl Event for DraftSaved {
    fn event_type(&self) -> &'static str {
        "drafts.saved"
    }
}

/// Queued listener routed by the event's region.
struct SendWelcomeMail {
    handled: Arc<AtomicUsize>,
}

impl Listener for SendWelcomeMail {
    fn call(&self, _method: &str, _arguments: &[Argument]) -> Result<(), ListenerError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ListenerType for SendWelcomeMail {
    const NAME: &'static str = "send_welcome_mail";
    const QUEUE: Option<&'static str> = Some("mail");

    fn via_connection(event: Option<&Argument>) -> Capability<String> {
        let region = event
            .and_then(|e| e.downcast_ref::<UserRegistered>())
            .map(|e| e.region);
        Capability::Resolved(region.filter(|r| *r == "eu").map(|_| "eu-queue".to_string()))
    }
}

/// Runs inline, never queued.
struct CountPageView {
    handled: Arc<AtomicUsize>,
}

impl Listener for CountPageView {
    fn call(&self, _method: &str, _arguments: &[Argument]) -> Result<(), ListenerError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ListenerType for CountPageView {
    const NAME: &'static str = "count_page_view";
    const QUEUED: bool = false;
}

/// Queued listener that always declines.
struct AutosaveBackup {
    handled: Arc<AtomicUsize>,
}

impl Listener for AutosaveBackup {
    fn call(&self, _method: &str, _arguments: &[Argument]) -> Result<(), ListenerError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn should_queue(&self, _arguments: &[Argument]) -> bool {
        false
    }
}

impl ListenerType for AutosaveBackup {
    const NAME: &'static str = "autosave_backup";
}

struct App {
    config: BatchConfig,
    transport: Transport,
    events: EventDispatcher,
    queue: Arc<InMemoryQueue>,
    eu_queue: Arc<InMemoryQueue>,
    mails: Arc<AtomicUsize>,
    page_views: Arc<AtomicUsize>,
    backups: Arc<AtomicUsize>,
}

impl App {
    fn new(config: BatchConfig) -> Self {
        queuebatch_observability::init_for_tests();

        let (queues, queue) = QueueManager::in_memory("memory");
        let eu_queue = Arc::new(InMemoryQueue::new("eu-queue"));
        queues.add_connection("eu-queue", eu_queue.clone());

        let mails = Arc::new(AtomicUsize::new(0));
        let page_views = Arc::new(AtomicUsize::new(0));
        let backups = Arc::new(AtomicUsize::new(0));

        let registry = ListenerRegistry::arc();
        {
            let handled = mails.clone();
            registry.register::<SendWelcomeMail, _>(move || SendWelcomeMail {
                handled: handled.clone(),
            });
        }
        {
            let handled = page_views.clone();
            registry.register::<CountPageView, _>(move || CountPageView {
                handled: handled.clone(),
            });
        }
        {
            let handled = backups.clone();
            registry.register::<AutosaveBackup, _>(move || AutosaveBackup {
                handled: handled.clone(),
            });
        }

        let transport = Transport::over_queues(Arc::new(queues), registry.clone());
        let events = EventDispatcher::new(
            registry,
            Arc::new(DirectListenerQueue::new(transport.clone())),
        );
        events.listen::<UserRegistered, SendWelcomeMail>();
        events.listen::<PageViewed, CountPageView>();
        events.listen::<DraftSaved, AutosaveBackup>();

        Self {
            config,
            transport,
            events,
            queue,
            eu_queue,
            mails,
            page_views,
            backups,
        }
    }

    fn testing() -> Self {
        Self::new(BatchConfig::default().with_synchronous_testing(true))
    }

    fn queued() -> Self {
        Self::new(BatchConfig::default())
    }

    fn context(&self) -> BatchContext {
        BatchContext::new(&self.config, self.transport.clone(), &self.events)
    }

    /// One request: open the scope, run the handler, terminate after the response.
    fn request<R>(
        &self,
        ctx: &BatchContext,
        handler: impl FnOnce() -> anyhow::Result<R>,
    ) -> anyhow::Result<(R, Option<FlushReport>)> {
        let hooks = BatchRequests::new(&self.config);
        let (response, scope) = hooks.handle(ctx, handler);
        let response = response?;
        let report = scope.terminate()?;
        Ok((response, report))
    }

    fn wrappers(&self) -> usize {
        self.queue.count_named(ProcessBatch::NAME)
    }
}

// ---------------------------------------------------------------------------
// Request-level behaviour (synchronous testing mode)
// ---------------------------------------------------------------------------

#[test]
fn queued_jobs_are_batched_and_run_at_request_end() -> anyhow::Result<()> {
    let app = App::testing();
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    let (status, report) = app.request(&ctx, || {
        ctx.bus().dispatch(CountJob::new("count_a", &count))?;
        ctx.bus().dispatch(CountJob::new("count_b", &count))?;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        Ok("ok")
    })?;

    assert_eq!(status, "ok");
    assert_eq!(report, Some(FlushReport::Wrapped { tasks: 1, items: 2 }));
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(app.queue.is_empty());
    Ok(())
}

#[test]
fn queued_listeners_are_batched_and_run_at_request_end() -> anyhow::Result<()> {
    let app = App::testing();
    let ctx = app.context();

    app.request(&ctx, || {
        ctx.events().fire(UserRegistered { region: "us" })?;
        ctx.events().fire(UserRegistered { region: "us" })?;
        assert_eq!(app.mails.load(Ordering::SeqCst), 0);
        Ok(())
    })?;

    assert_eq!(app.mails.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn non_queued_listeners_run_immediately_and_are_not_batched() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();

    let (_, report) = app.request(&ctx, || {
        ctx.events().fire(PageViewed)?;
        assert_eq!(app.page_views.load(Ordering::SeqCst), 1);
        Ok(())
    })?;

    assert_eq!(report, Some(FlushReport::Empty));
    assert_eq!(app.wrappers(), 0);
    assert!(app.queue.is_empty());
    Ok(())
}

#[test]
fn declined_listeners_are_neither_queued_nor_run() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();

    let (_, report) = app.request(&ctx, || {
        ctx.events().fire(DraftSaved)?;
        Ok(())
    })?;

    assert_eq!(report, Some(FlushReport::Empty));
    assert_eq!(app.backups.load(Ordering::SeqCst), 0);
    assert!(app.queue.is_empty());
    Ok(())
}

#[test]
fn dispatch_inside_inline_listener_is_still_batched() -> anyhow::Result<()> {
    let app = App::testing();
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));
    {
        let bus = ctx.bus().clone();
        let count = count.clone();
        app.events.listen_fn::<PageViewed, _>(move |_| {
            bus.dispatch(CountJob::new("count_a", &count))
                .map_err(|e| ListenerError::failed(e.to_string()))?;
            bus.dispatch(CountJob::new("count_b", &count))
                .map_err(|e| ListenerError::failed(e.to_string()))
        });
    }

    app.request(&ctx, || {
        ctx.events().fire(PageViewed)?;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.manager().map(|m| m.buffered()), Some(2));
        Ok(())
    })?;

    assert_eq!(count.load(Ordering::SeqCst), 2);
    Ok(())
}

// ---------------------------------------------------------------------------
// Flush shapes (normal queued mode)
// ---------------------------------------------------------------------------

#[test]
fn seven_jobs_with_batch_size_three_make_three_wrappers() -> anyhow::Result<()> {
    let app = App::new(BatchConfig::default().with_max_batch_size(3));
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    let (_, report) = app.request(&ctx, || {
        for _ in 0..7 {
            ctx.bus().dispatch(CountJob::new("count_a", &count))?;
        }
        Ok(())
    })?;

    assert_eq!(report, Some(FlushReport::Wrapped { tasks: 3, items: 7 }));
    let sizes: Vec<usize> = app.queue.inspect(|tasks| {
        tasks
            .iter()
            .filter_map(|t| t.task.as_job()?.downcast_ref::<ProcessBatch>().map(ProcessBatch::len))
            .collect()
    });
    assert_eq!(sizes, vec![3, 3, 1]);
    Ok(())
}

#[test]
fn two_queued_listener_calls_make_one_wrapper() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();

    app.request(&ctx, || {
        ctx.events().fire(UserRegistered { region: "us" })?;
        ctx.events().fire(UserRegistered { region: "us" })?;
        Ok(())
    })?;

    assert_eq!(app.wrappers(), 1);
    Ok(())
}

#[test]
fn mixed_jobs_and_listeners_share_one_wrapper_in_order() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    app.request(&ctx, || {
        ctx.bus().dispatch(CountJob::new("count_a", &count))?;
        ctx.events().fire(UserRegistered { region: "us" })?;
        ctx.bus().dispatch(CountJob::new("count_b", &count))?;
        Ok(())
    })?;

    assert_eq!(app.queue.len(), 1);
    let names: Vec<String> = app.queue.inspect(|tasks| {
        let wrapper = tasks[0]
            .task
            .as_job()
            .and_then(|j| j.downcast_ref::<ProcessBatch>())
            .expect("wrapper task");
        wrapper.items().iter().map(|i| i.name().to_string()).collect()
    });
    assert_eq!(names, vec!["count_a", "send_welcome_mail", "count_b"]);
    Ok(())
}

#[test]
fn dispatch_sync_is_never_buffered() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    let (_, report) = app.request(&ctx, || {
        ctx.bus().dispatch_sync(CountJob::new("count_a", &count))?;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        Ok(())
    })?;

    assert_eq!(report, Some(FlushReport::Empty));
    assert!(app.queue.is_empty());
    Ok(())
}

#[test]
fn single_job_is_pushed_without_wrapper() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    let (_, report) = app.request(&ctx, || {
        let mut job = CountJob::new("count_a", &count);
        job.options = DispatchOptions::new()
            .on_queue("high")
            .with_delay(Duration::from_secs(5));
        ctx.bus().dispatch(job)?;
        Ok(())
    })?;

    assert_eq!(report, Some(FlushReport::Direct));
    assert_eq!(app.wrappers(), 0);
    app.queue.inspect(|tasks| {
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task.name(), "count_a");
        assert_eq!(tasks[0].queue.as_deref(), Some("high"));
        assert_eq!(tasks[0].delay, Some(Duration::from_secs(5)));
    });
    Ok(())
}

#[test]
fn single_listener_call_is_pushed_without_wrapper() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();

    let (_, report) = app.request(&ctx, || {
        ctx.events().fire(UserRegistered { region: "eu" })?;
        Ok(())
    })?;

    assert_eq!(report, Some(FlushReport::Direct));
    assert!(app.queue.is_empty());
    app.eu_queue.inspect(|tasks| {
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task.name(), "send_welcome_mail");
        assert_eq!(tasks[0].queue.as_deref(), Some("mail"));
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Worker round trip
// ---------------------------------------------------------------------------

#[test]
fn worker_replays_wrappers_with_per_item_options() -> anyhow::Result<()> {
    let app = App::queued();
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    app.request(&ctx, || {
        let mut job = CountJob::new("count_a", &count);
        job.options = DispatchOptions::new().on_queue("reports");
        ctx.bus().dispatch(job)?;
        ctx.events().fire(UserRegistered { region: "us" })?;
        Ok(())
    })?;
    assert_eq!(app.wrappers(), 1);

    let mut worker = QueueWorker::new(app.queue.clone(), app.transport.clone());
    assert!(worker.run_next()?.is_some());

    app.queue.inspect(|tasks| {
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task.name(), "count_a");
        assert_eq!(tasks[0].queue.as_deref(), Some("reports"));
        assert_eq!(tasks[1].task.name(), "send_welcome_mail");
        assert_eq!(tasks[1].queue.as_deref(), Some("mail"));
    });

    let stats = worker.work_until_empty()?.clone();
    assert_eq!(stats.tasks_succeeded, 3);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(app.mails.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn failing_item_in_replayed_wrapper_keeps_earlier_items_queued() -> anyhow::Result<()> {
    let app = App::new(BatchConfig::default().with_max_batch_size(2));
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));
    let manager = ctx.manager().expect("batching enabled").clone();

    manager.begin(DispatchOptions::default());
    ctx.bus().dispatch(CountJob::new("count_a", &count))?;
    ctx.bus().dispatch(CountJob::new("count_b", &count))?;
    let mut stray = CountJob::new("count_c", &count);
    stray.options = DispatchOptions::new().on_connection("missing");
    ctx.bus().dispatch(stray)?;
    ctx.bus().dispatch(CountJob::new("count_d", &count))?;

    let report = manager.commit()?;
    assert_eq!(report, Some(FlushReport::Wrapped { tasks: 2, items: 4 }));

    // The second wrapper holds the job bound to an unknown connection. Its
    // replay fails there, after the first wrapper's jobs were already re-queued.
    let mut worker = QueueWorker::new(app.queue.clone(), app.transport.clone());
    worker.run_next()?;
    let outcome = worker.run_next()?.expect("second wrapper");
    assert!(matches!(outcome, queuebatch_infra::TaskOutcome::Failed(_)));
    assert_eq!(app.queue.count_named("count_a"), 1);
    assert_eq!(app.queue.count_named("count_b"), 1);
    assert_eq!(app.queue.count_named("count_d"), 0);
    Ok(())
}

#[test]
fn disabled_batching_dispatches_straight_through() -> anyhow::Result<()> {
    let app = App::new(BatchConfig::default().with_enabled(false));
    let ctx = app.context();
    let count = Arc::new(AtomicUsize::new(0));

    let (_, report) = app.request(&ctx, || {
        ctx.bus().dispatch(CountJob::new("count_a", &count))?;
        ctx.bus().dispatch(CountJob::new("count_b", &count))?;
        assert_eq!(app.queue.len(), 2);
        Ok(())
    })?;

    assert_eq!(report, None);
    assert_eq!(app.wrappers(), 0);
    Ok(())
}
