//! Top-level wiring.
//!
//! An [`Engine`] owns the resource tree, the loopback transport, the
//! shared interval scheduler and the set of installed app contexts, and
//! hands out [`OutgoingRequest`] clients bound to the loopback. Installing
//! an app claims a mount path in the tree and routes every handler
//! invocation under it onto the app's own context.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use coapling_client::{CallbackExecutor, InlineExecutor, OutgoingRequest, Transport};
use coapling_core::{Error, Path};
use coapling_host::{
    AppContext, Clock, IntervalHandle, IntervalScheduler, Properties, SystemClock,
};
use coapling_server::{Handlers, NotifyOptions, ResourceNode, ResourceTree};
use tracing::info;

use crate::loopback::LoopbackTransport;

/// One installed app: its execution context and its mount node.
#[derive(Clone)]
pub struct AppHandle {
    context: Arc<AppContext>,
    node: Arc<ResourceNode>,
}

impl AppHandle {
    /// The app's execution context; handler invocations, interval ticks
    /// and async callbacks for this app all run here.
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// The node the app is mounted at. The app attaches its resources
    /// beneath it.
    pub fn node(&self) -> &Arc<ResourceNode> {
        &self.node
    }
}

/// The assembled application-server core.
pub struct Engine {
    tree: Arc<ResourceTree>,
    transport: Arc<LoopbackTransport>,
    scheduler: IntervalScheduler,
    clock: SystemClock,
    properties: Properties,
    notify_options: NotifyOptions,
    apps: Mutex<Vec<AppHandle>>,
    intervals: Mutex<Vec<(Arc<AppContext>, IntervalHandle)>>,
}

impl Engine {
    pub fn new() -> Self {
        Engine::with_properties(Properties::new())
    }

    pub fn with_properties(properties: Properties) -> Self {
        let tree = Arc::new(ResourceTree::new());
        Engine {
            transport: LoopbackTransport::new(Arc::clone(&tree)),
            tree,
            scheduler: IntervalScheduler::new(),
            clock: SystemClock::new(),
            properties,
            notify_options: NotifyOptions::default(),
            apps: Mutex::new(Vec::new()),
            intervals: Mutex::new(Vec::new()),
        }
    }

    /// Observer-notification delivery options used by [`Engine::changed`].
    pub fn set_notify_options(&mut self, options: NotifyOptions) {
        self.notify_options = options;
    }

    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    pub fn root(&self) -> &Arc<ResourceNode> {
        self.tree.root()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport) as Arc<dyn Transport>
    }

    pub fn clock(&self) -> &SystemClock {
        &self.clock
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Install an app: claim `mount` in the tree, spawn the app's context
    /// and route handler invocations under the mount onto it.
    ///
    /// Fails with `Conflict` if the mount path is already taken.
    pub fn install_app(&self, name: &str, mount: &Path) -> Result<AppHandle, Error> {
        let node = self.tree.register(mount, Handlers::new())?;
        let context = AppContext::spawn(name);
        self.transport.mount(
            mount.clone(),
            Arc::clone(&context) as Arc<dyn CallbackExecutor>,
        );

        let handle = AppHandle { context, node };
        self.apps.lock().unwrap().push(handle.clone());
        info!(app = name, mount = %mount, "app installed");
        Ok(handle)
    }

    /// Remove an installed app: cancel its interval registrations, run its
    /// unload hooks, stop its context and detach its subtree. Idempotent.
    pub fn uninstall_app(&self, handle: &AppHandle) -> Result<(), Error> {
        self.apps
            .lock()
            .unwrap()
            .retain(|entry| !Arc::ptr_eq(&entry.context, &handle.context));
        self.cancel_intervals_for(&handle.context);
        self.transport.unmount(handle.node.path());
        handle.context.shutdown();
        self.tree.remove(&handle.node)?;
        info!(app = handle.context.name(), "app uninstalled");
        Ok(())
    }

    fn cancel_intervals_for(&self, context: &Arc<AppContext>) {
        let cancelled: Vec<IntervalHandle> = {
            let mut intervals = self.intervals.lock().unwrap();
            let (owned, kept): (Vec<_>, Vec<_>) = intervals
                .drain(..)
                .partition(|(owner, _)| Arc::ptr_eq(owner, context));
            *intervals = kept;
            owned.into_iter().map(|(_, handle)| handle).collect()
        };
        for handle in cancelled {
            self.scheduler.cancel(handle);
        }
    }

    /// A client running its callbacks inline on whichever thread delivers
    /// the completion.
    pub fn client(&self) -> OutgoingRequest {
        OutgoingRequest::new(self.transport(), Arc::new(InlineExecutor))
    }

    /// A client whose callbacks run on `app`'s context, serialized with
    /// its handlers and ticks.
    pub fn client_for(&self, app: &AppHandle) -> OutgoingRequest {
        OutgoingRequest::new(
            self.transport(),
            Arc::clone(app.context()) as Arc<dyn CallbackExecutor>,
        )
    }

    /// Register a periodic task on `app`'s context. The registration is
    /// cancelled automatically when the app is uninstalled.
    pub fn set_interval(
        &self,
        app: &AppHandle,
        period: Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) -> IntervalHandle {
        let handle = self.scheduler.set_interval(
            Arc::clone(app.context()) as Arc<dyn CallbackExecutor>,
            period,
            task,
        );
        self.intervals
            .lock()
            .unwrap()
            .push((Arc::clone(app.context()), handle));
        handle
    }

    pub fn cancel_interval(&self, handle: IntervalHandle) {
        self.intervals
            .lock()
            .unwrap()
            .retain(|(_, registered)| *registered != handle);
        self.scheduler.cancel(handle);
    }

    /// Push `node`'s current content to its observers using the engine's
    /// delivery options.
    pub fn changed(&self, node: &Arc<ResourceNode>) {
        node.changed_with(&self.notify_options);
    }

    /// Monotonic nanoseconds, for app-side duration measurement.
    pub fn nano_time(&self) -> u64 {
        self.clock.monotonic_nanos()
    }

    /// Stop everything: no further ticks fire, every app's unload hooks
    /// run ahead of its still-pending tasks, and all contexts join.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.intervals.lock().unwrap().clear();
        let apps: Vec<AppHandle> = self.apps.lock().unwrap().drain(..).collect();
        for app in &apps {
            self.transport.unmount(app.node.path());
            app.context.shutdown();
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coapling_core::path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn install_claims_the_mount_path_once() {
        let engine = Engine::new();
        engine.install_app("timer", &path!("apps/running/timer")).unwrap();
        assert!(matches!(
            engine.install_app("timer2", &path!("apps/running/timer")),
            Err(Error::Conflict { .. })
        ));
        assert!(engine.tree().resolve(&path!("apps/running/timer")).is_ok());
    }

    #[test]
    fn uninstall_runs_unload_hooks_and_detaches_the_subtree() {
        let engine = Engine::new();
        let app = engine.install_app("stopper", &path!("apps/running/stopper")).unwrap();

        let unloaded = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&unloaded);
        app.context().on_unload(move || flag.store(true, Ordering::SeqCst));

        engine.uninstall_app(&app).unwrap();
        assert!(unloaded.load(Ordering::SeqCst));
        assert!(matches!(
            engine.tree().resolve(&path!("apps/running/stopper")),
            Err(Error::NotFound { .. })
        ));

        // Idempotent.
        engine.uninstall_app(&app).unwrap();
    }

    #[test]
    fn uninstall_cancels_the_apps_intervals() {
        let engine = Engine::new();
        let app = engine
            .install_app("ticker", &path!("apps/running/ticker"))
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        engine.set_interval(&app, Duration::from_millis(15), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(80));
        engine.uninstall_app(&app).unwrap();
        let at_uninstall = count.load(Ordering::SeqCst);
        assert!(at_uninstall >= 1, "interval never ticked");

        // A tick already posted may still have run, but no new tick fires.
        std::thread::sleep(Duration::from_millis(100));
        assert!(count.load(Ordering::SeqCst) <= at_uninstall + 1);
        assert!(engine.intervals.lock().unwrap().is_empty());
    }

    #[test]
    fn shutdown_stops_installed_apps() {
        let engine = Engine::new();
        let app = engine.install_app("quiet", &path!("apps/running/quiet")).unwrap();

        let unloaded = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&unloaded);
        app.context().on_unload(move || flag.store(true, Ordering::SeqCst));

        engine.shutdown();
        assert!(unloaded.load(Ordering::SeqCst));
    }
}
