//! Execution: contexts, cancellation, and the three executors.
//!
//! All executors share one contract: inputs go in through `submit`, outputs
//! come back from `collect` in strict submission order, and the produced
//! bytes are identical whichever executor ran them. Parallelism never
//! changes results, only wall-clock time.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{Error, Result};
use crate::filter::{Filter, FilterRef, PortValues};
use crate::geometry::Value;
use crate::graph::{Graph, NodeKind};
use crate::image::Image;
use crate::pipeline::Pipeline;

/// A structured cancellation token: cancelling a parent cancels every
/// descendant; a deadline behaves like a timed cancel.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancelToken>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// A token that cancels itself at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
                parent: None,
            }),
        }
    }

    /// A child token; cancelling `self` cancels the child, not vice versa.
    pub fn child(&self) -> Self {
        CancelToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                deadline: self.inner.deadline,
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        match &self.inner.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}

/// Counters an executor exposes to interested callers.
#[derive(Default)]
pub struct Stats {
    pub frames_in: AtomicU64,
    pub frames_out: AtomicU64,
    pub node_invocations: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Stats::default())
    }
}

/// The explicit execution context threaded through `apply`.
///
/// Carries only what the engine needs: the cancellation token, the
/// per-frame sequence number, and an optional stats sink.
#[derive(Clone, Default)]
pub struct Context {
    cancel: CancelToken,
    frame: u64,
    stats: Option<Arc<Stats>>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn with_cancel(cancel: CancelToken) -> Self {
        Context {
            cancel,
            frame: 0,
            stats: None,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn for_frame(&self, frame: u64) -> Context {
        Context {
            cancel: self.cancel.clone(),
            frame,
            stats: self.stats.clone(),
        }
    }

    pub fn with_stats(mut self, stats: Arc<Stats>) -> Context {
        self.stats = Some(stats);
        self
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    pub(crate) fn count_invocation(&self) {
        if let Some(stats) = &self.stats {
            stats.node_invocations.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count_frame_in(&self) {
        if let Some(stats) = &self.stats {
            stats.frames_in.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count_frame_out(&self) {
        if let Some(stats) = &self.stats {
            stats.frames_out.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The common executor surface: a stream in, the same stream out, in
/// order.
pub trait Executor {
    /// Enqueue one input. Blocks when the executor is at capacity.
    fn submit(&mut self, image: Image) -> Result<()>;

    /// The next output, in submission order. `None` when nothing is
    /// in flight.
    fn collect(&mut self) -> Option<Result<Image>>;

    /// How many submitted inputs have not been collected yet.
    fn pending(&self) -> usize;
}

/// Pure single-thread execution; the deterministic baseline.
pub struct SequentialExecutor {
    runner: FilterRef,
    ctx: Context,
    next_frame: u64,
    results: std::collections::VecDeque<Result<Image>>,
}

impl SequentialExecutor {
    pub fn new(runner: FilterRef, ctx: Context) -> Self {
        SequentialExecutor {
            runner,
            ctx,
            next_frame: 0,
            results: Default::default(),
        }
    }

    pub fn for_pipeline(pipeline: Pipeline, ctx: Context) -> Self {
        SequentialExecutor::new(pipeline.into_ref(), ctx)
    }
}

impl Executor for SequentialExecutor {
    fn submit(&mut self, image: Image) -> Result<()> {
        self.ctx.check_cancelled()?;
        self.ctx.count_frame_in();
        let frame_ctx = self.ctx.for_frame(self.next_frame);
        self.next_frame += 1;
        frame_ctx.count_invocation();
        let result = crate::filter::Filter::apply(self.runner.as_ref(), &image, &frame_ctx);
        self.results.push_back(result);
        Ok(())
    }

    fn collect(&mut self) -> Option<Result<Image>> {
        let result = self.results.pop_front();
        if result.is_some() {
            self.ctx.count_frame_out();
        }
        result
    }

    fn pending(&self) -> usize {
        self.results.len()
    }
}

/// Configuration of [`DataParallelExecutor`].
#[derive(Clone, Copy, Debug)]
pub struct DataParallelConfig {
    /// Worker thread count. Defaults to the hardware thread count.
    pub workers: usize,
    /// Extra in-flight inputs beyond one per worker before `submit`
    /// blocks.
    pub warmup: usize,
}

impl Default for DataParallelConfig {
    fn default() -> Self {
        DataParallelConfig {
            workers: num_cpus::get(),
            warmup: num_cpus::get(),
        }
    }
}

/// Whole-pipeline-per-worker execution for throughput.
///
/// Each input runs to completion on one worker; a reorder buffer keyed by
/// the monotonically increasing sequence number restores submission order
/// on the way out.
pub struct DataParallelExecutor {
    injector: Option<Sender<(u64, Image)>>,
    results: Receiver<(u64, Result<Image>)>,
    workers: Vec<JoinHandle<()>>,
    reorder: BTreeMap<u64, Result<Image>>,
    next_submit: u64,
    next_emit: u64,
    ctx: Context,
}

impl DataParallelExecutor {
    pub fn new(runner: FilterRef, config: DataParallelConfig, ctx: Context) -> Self {
        let workers = config.workers.max(1);
        let (injector, inbox) = bounded::<(u64, Image)>(workers + config.warmup);
        let (outlet, results) = unbounded();

        let handles = (0..workers)
            .map(|worker| {
                let inbox = inbox.clone();
                let outlet = outlet.clone();
                let runner = runner.clone();
                let ctx = ctx.clone();
                std::thread::Builder::new()
                    .name(format!("rasterflow-worker-{}", worker))
                    .spawn(move || {
                        for (frame, image) in inbox.iter() {
                            let frame_ctx = ctx.for_frame(frame);
                            let result = if frame_ctx.check_cancelled().is_err() {
                                Err(Error::cancelled())
                            } else {
                                frame_ctx.count_invocation();
                                crate::filter::Filter::apply(
                                    runner.as_ref(),
                                    &image,
                                    &frame_ctx,
                                )
                            };
                            if outlet.send((frame, result)).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("spawning executor worker")
            })
            .collect();

        DataParallelExecutor {
            injector: Some(injector),
            results,
            workers: handles,
            reorder: BTreeMap::new(),
            next_submit: 0,
            next_emit: 0,
            ctx,
        }
    }

    pub fn for_pipeline(pipeline: Pipeline, config: DataParallelConfig, ctx: Context) -> Self {
        DataParallelExecutor::new(pipeline.into_ref(), config, ctx)
    }
}

impl Executor for DataParallelExecutor {
    fn submit(&mut self, image: Image) -> Result<()> {
        self.ctx.check_cancelled()?;
        let injector = self
            .injector
            .as_ref()
            .ok_or_else(|| Error::exhausted("executor already shut down"))?;
        injector
            .send((self.next_submit, image))
            .map_err(|_| Error::exhausted("executor workers exited"))?;
        self.next_submit += 1;
        self.ctx.count_frame_in();
        Ok(())
    }

    fn collect(&mut self) -> Option<Result<Image>> {
        if self.next_emit == self.next_submit {
            return None;
        }
        loop {
            if let Some(result) = self.reorder.remove(&self.next_emit) {
                self.next_emit += 1;
                self.ctx.count_frame_out();
                return Some(result);
            }
            match self.results.recv() {
                Ok((frame, result)) => {
                    self.reorder.insert(frame, result);
                }
                Err(_) => {
                    self.next_emit += 1;
                    return Some(Err(Error::exhausted("executor workers exited")));
                }
            }
        }
    }

    fn pending(&self) -> usize {
        (self.next_submit - self.next_emit) as usize
    }
}

impl Drop for DataParallelExecutor {
    fn drop(&mut self) {
        // Closing the injector lets the workers drain and exit.
        self.injector.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Configuration of [`StageParallelExecutor`].
#[derive(Clone, Copy, Debug)]
pub struct StageParallelConfig {
    /// Bounded capacity of each inter-stage queue.
    pub queue_capacity: usize,
}

impl Default for StageParallelConfig {
    fn default() -> Self {
        StageParallelConfig { queue_capacity: 4 }
    }
}

type Frame = core::result::Result<Value, Error>;

/// One worker per graph node, bounded FIFO queues on every edge.
///
/// Backpressure falls out of blocking sends on full queues. A failing
/// frame poisons only its own flow: the error travels the same edges as a
/// value would and surfaces at `collect`, while later frames continue.
/// Dropping the executor closes the head queue; workers drain and exit.
pub struct StageParallelExecutor {
    feed: Option<Sender<Frame>>,
    output: Receiver<Frame>,
    workers: Vec<JoinHandle<()>>,
    submitted: u64,
    collected: u64,
    ctx: Context,
}

impl StageParallelExecutor {
    /// Run a single-source, single-sink graph with one worker per node.
    pub fn for_graph(graph: Arc<Graph>, config: StageParallelConfig, ctx: Context) -> Result<Self> {
        if graph.source_names().len() != 1 || graph.sink_names().len() != 1 {
            return Err(Error::graph(
                "the stage-parallel executor drives graphs with exactly one source and one sink",
            ));
        }
        let capacity = config.queue_capacity.max(1);

        // One bounded SPSC channel per edge.
        let mut edge_tx = Vec::with_capacity(graph.edges.len());
        let mut edge_rx = Vec::with_capacity(graph.edges.len());
        for _ in &graph.edges {
            let (tx, rx) = bounded::<Frame>(capacity);
            edge_tx.push(Some(tx));
            edge_rx.push(Some(rx));
        }

        let (feed, feed_rx) = bounded::<Frame>(capacity);
        // The outlet is unbounded: backpressure applies between stages and
        // at `submit`, never between the sink and a slow collector.
        let (sink_tx, output) = unbounded::<Frame>();
        let mut feed_rx = Some(feed_rx);

        let mut workers = Vec::with_capacity(graph.nodes.len());
        for index in 0..graph.nodes.len() {
            let node_in: Vec<(String, Receiver<Frame>)> = graph
                .edges
                .iter()
                .enumerate()
                .filter(|(_, edge)| edge.to == index)
                .map(|(at, edge)| (edge.to_port.clone(), edge_rx[at].take().expect("edge taken twice")))
                .collect();
            let node_out: Vec<(String, Sender<Frame>)> = graph
                .edges
                .iter()
                .enumerate()
                .filter(|(_, edge)| edge.from == index)
                .map(|(at, edge)| (edge.from_port.clone(), edge_tx[at].take().expect("edge taken twice")))
                .collect();

            let worker = match &graph.nodes[index].kind {
                NodeKind::Source { .. } => {
                    let inbox = feed_rx.take().expect("a single source");
                    spawn_node(&graph.nodes[index].name, move || {
                        source_loop(inbox, node_out)
                    })
                }
                NodeKind::Sink => {
                    let outlet = sink_tx.clone();
                    spawn_node(&graph.nodes[index].name, move || {
                        sink_loop(node_in, outlet)
                    })
                }
                NodeKind::Filter(filter) => {
                    let filter = filter.clone();
                    let ctx = ctx.clone();
                    spawn_node(&graph.nodes[index].name, move || {
                        filter_loop(filter, node_in, node_out, ctx)
                    })
                }
            };
            workers.push(worker);
        }
        drop(sink_tx);

        Ok(StageParallelExecutor {
            feed: Some(feed),
            output,
            workers,
            submitted: 0,
            collected: 0,
            ctx,
        })
    }

    pub fn for_pipeline(
        pipeline: &Pipeline,
        config: StageParallelConfig,
        ctx: Context,
    ) -> Result<Self> {
        let graph = Graph::from_pipeline(pipeline)?;
        StageParallelExecutor::for_graph(Arc::new(graph), config, ctx)
    }
}

fn spawn_node(name: &str, body: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("rasterflow-node-{}", name))
        .spawn(body)
        .expect("spawning stage worker")
}

fn broadcast(outputs: &[(String, Sender<Frame>)], mut produce: impl FnMut(&str) -> Frame) -> bool {
    for (port, sender) in outputs {
        if sender.send(produce(port)).is_err() {
            return false;
        }
    }
    true
}

fn source_loop(inbox: Receiver<Frame>, outputs: Vec<(String, Sender<Frame>)>) {
    for frame in inbox.iter() {
        let alive = match frame {
            Ok(value) => broadcast(&outputs, |_| Ok(value.clone())),
            Err(error) => broadcast(&outputs, |_| Err(error.duplicate())),
        };
        if !alive {
            break;
        }
    }
}

fn sink_loop(inputs: Vec<(String, Receiver<Frame>)>, outlet: Sender<Frame>) {
    // Validation guarantees exactly one inbound edge.
    if let Some((_, inbox)) = inputs.into_iter().next() {
        for frame in inbox.iter() {
            if outlet.send(frame).is_err() {
                break;
            }
        }
    }
}

fn filter_loop(
    filter: FilterRef,
    inputs: Vec<(String, Receiver<Frame>)>,
    outputs: Vec<(String, Sender<Frame>)>,
    ctx: Context,
) {
    let mut frame_number = 0u64;
    loop {
        // One frame is one value from every inbound edge, in port order.
        let mut bound = PortValues::new();
        let mut poisoned: Option<Error> = None;
        let mut closed = false;
        for (port, inbox) in &inputs {
            match inbox.recv() {
                Ok(Ok(value)) => bound.insert(port, value),
                Ok(Err(error)) => poisoned = Some(error),
                Err(_) => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            break;
        }

        let frame_ctx = ctx.for_frame(frame_number);
        frame_number += 1;

        let produced: core::result::Result<PortValues, Error> = match poisoned {
            Some(error) => Err(error),
            None => {
                // Cancellation is polled between node invocations.
                if let Err(error) = frame_ctx.check_cancelled() {
                    Err(error)
                } else {
                    frame_ctx.count_invocation();
                    filter.apply_multi(bound, &frame_ctx)
                }
            }
        };

        let alive = match produced {
            Ok(values) => broadcast(&outputs, |port| match values.get(port) {
                Some(value) => Ok(value.clone()),
                None => Err(Error::graph(format!(
                    "filter `{}` produced no value on port `{}`",
                    filter.kind(),
                    port
                ))),
            }),
            Err(error) => broadcast(&outputs, |_| Err(error.duplicate())),
        };
        if !alive {
            break;
        }
    }
}

impl Executor for StageParallelExecutor {
    fn submit(&mut self, image: Image) -> Result<()> {
        // Checked before each enqueue; a cancelled executor stops
        // accepting new work.
        self.ctx.check_cancelled()?;
        let feed = self
            .feed
            .as_ref()
            .ok_or_else(|| Error::exhausted("executor already shut down"))?;
        feed.send(Ok(Value::Image(image)))
            .map_err(|_| Error::exhausted("executor workers exited"))?;
        self.submitted += 1;
        self.ctx.count_frame_in();
        Ok(())
    }

    fn collect(&mut self) -> Option<Result<Image>> {
        if self.collected == self.submitted {
            return None;
        }
        self.collected += 1;
        self.ctx.count_frame_out();
        match self.output.recv() {
            Ok(Ok(Value::Image(image))) => Some(Ok(image)),
            Ok(Ok(other)) => Some(Err(Error::invalid_argument(
                "sink",
                format!("sink produced {}, expected image", other.kind().name()),
            ))),
            Ok(Err(error)) => Some(Err(error)),
            Err(_) => Some(Err(Error::exhausted("executor workers exited"))),
        }
    }

    fn pending(&self) -> usize {
        (self.submitted - self.collected) as usize
    }
}

impl Drop for StageParallelExecutor {
    fn drop(&mut self) {
        // Closing the head queue cascades: every worker drains and exits.
        self.feed.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn token_hierarchy() {
        let parent = CancelToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(parent.is_cancelled());

        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn deadline_cancels() {
        let token = CancelToken::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(token.is_cancelled());
        let future = CancelToken::with_deadline(Instant::now() + Duration::from_secs(3600));
        assert!(!future.is_cancelled());
    }
}
