//! Pipelines: ordered modules run against one inventory.

use crate::cancel::CancelToken;
use crate::context::RunContext;
use crate::module::Module;
use crate::progress::{NoProgress, ProgressCallback};
use crate::result::{Phase, PipelineResult};
use connector::ConnectorFactory;
use inventory::{Cache, Inventory};
use std::sync::{Mutex, PoisonError};

/// Default number of hosts a parallel task works on at once
pub const DEFAULT_CONCURRENCY: usize = 10;

/// An ordered list of modules. Each run gets a fresh pipeline-scope cache.
pub struct Pipeline {
    /// Pipeline name
    pub name: String,
    /// Modules in execution order
    pub modules: Vec<Module>,
    concurrency: usize,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Append a module
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Cap parallel tasks at `limit` hosts at once (minimum 1)
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Keep only tasks selected by `only`/`skip` tags; emptied modules are dropped
    pub fn select_tags(mut self, only: &[String], skip: &[String]) -> Self {
        for module in &mut self.modules {
            module.retain_tags(only, skip);
        }
        self.modules.retain(|module| module.all_tasks().next().is_some());
        self
    }

    /// Run every module to completion
    pub fn run(&self, inventory: &Inventory, factory: &dyn ConnectorFactory) -> PipelineResult {
        self.run_with(inventory, factory, &NoProgress, &CancelToken::new())
    }

    /// Run with progress reporting and cancellation
    pub fn run_with(
        &self,
        inventory: &Inventory,
        factory: &dyn ConnectorFactory,
        progress: &dyn ProgressCallback,
        cancel: &CancelToken,
    ) -> PipelineResult {
        let status = Mutex::new(PipelineResult::default());
        self.execute(inventory, factory, progress, cancel, &status);
        status.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run while publishing partial results into `status`
    pub(crate) fn execute(
        &self,
        inventory: &Inventory,
        factory: &dyn ConnectorFactory,
        progress: &dyn ProgressCallback,
        cancel: &CancelToken,
        status: &Mutex<PipelineResult>,
    ) {
        let update = |f: &dyn Fn(&mut PipelineResult)| {
            f(&mut status.lock().unwrap_or_else(PoisonError::into_inner));
        };
        update(&|r| r.phase = Phase::Running);
        log::info!("Pipeline {}: {} module(s)", self.name, self.modules.len());

        let pipeline_cache = Cache::new();
        let rt = RunContext::new(
            inventory,
            factory,
            progress,
            cancel,
            &pipeline_cache,
            self.concurrency,
            status,
        );

        let total = self.modules.len();
        for (index, module) in self.modules.iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Pipeline {}: cancelled before module {}", self.name, module.name);
                update(&|r| r.fail("pipeline cancelled"));
                break;
            }

            progress.on_module_start(&module.name, index, total);
            if let Err(e) = module.run(&rt) {
                log::error!("Pipeline {}: module {} failed: {e}", self.name, module.name);
                let reason = format!("module \"{}\": {e}", module.name);
                update(&|r| r.fail(reason.clone()));
                break;
            }
        }

        update(&|r| {
            if r.phase == Phase::Running {
                r.phase = Phase::Succeeded;
            }
        });
        let guard = status.lock().unwrap_or_else(PoisonError::into_inner);
        log::info!("Pipeline {}: {}", self.name, guard.phase);
        log::debug!("{guard}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{self, Command, SetFact};
    use crate::context::{HostContext, Scope};
    use crate::module::{GroupEmpty, PipelineCacheEquals};
    use crate::prepare::{CacheEquals, FirstHost};
    use crate::retry::RetryPolicy;
    use crate::serial::SerialEntry;
    use crate::task::Task;
    use crate::testing::MockFactory;
    use inventory::Group;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fleet(hosts: &[&str]) -> Inventory {
        let mut inv = Inventory::new();
        for host in hosts {
            inv.add_host(*host, json!({}));
        }
        inv.add_group("k8s_cluster", Group::with_hosts(hosts.iter().copied()));
        inv
    }

    fn single(task: Task) -> Pipeline {
        Pipeline::new("test").module(Module::new("m").task(task))
    }

    #[test]
    fn test_retry_bound() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new().fail(None, "flaky", 1, "nope");
        let pipeline = single(
            Task::new("flaky", Command::new("flaky"))
                .hosts(["n1"])
                .retry(RetryPolicy::new(3, Duration::ZERO)),
        );

        let result = pipeline.run(&inv, &factory);
        assert_eq!(factory.connector("n1").count("flaky"), 4);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].hosts[0].stderr, "nope");
    }

    #[test]
    fn test_resolution_errors_are_not_retried() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let pipeline = single(
            Task::new("render", Command::new("echo {{ undefined_var }}"))
                .hosts(["n1"])
                .retry(RetryPolicy::new(5, Duration::ZERO)),
        );

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert!(factory.connector("n1").calls().is_empty());
        assert!(result.reason.unwrap().contains("template error"));
    }

    #[test]
    fn test_ignore_error_containment() {
        let inv = fleet(&["n1", "n2"]);
        let factory = MockFactory::new().fail(Some("n2"), "preflight", 2, "swap on");
        let pipeline = Pipeline::new("test").module(
            Module::new("m")
                .task(
                    Task::new("preflight", Command::new("preflight"))
                        .hosts(["k8s_cluster"])
                        .parallel()
                        .ignore_error(),
                )
                .task(Task::new("install", Command::new("install")).hosts(["k8s_cluster"])),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!((result.total, result.succeeded, result.ignored), (2, 1, 1));
        assert_eq!(factory.hosts_running("install"), vec!["n1", "n2"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].task, "preflight");
        assert_eq!(result.failures[0].hosts[0].host, "n2");
        assert_eq!(result.failures[0].hosts[0].stderr, "swap on");
    }

    #[test]
    fn test_failure_aborts_module_and_pipeline() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new().fail(None, "init", 1, "port in use");
        let pipeline = Pipeline::new("test")
            .module(
                Module::new("bootstrap")
                    .task(Task::new("init", Command::new("init")).hosts(["n1"]))
                    .task(Task::new("after", Command::new("after")).hosts(["n1"])),
            )
            .module(Module::new("next").task(Task::new("later", Command::new("later")).hosts(["n1"])));

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(result.total, 1);
        let conn = factory.connector("n1");
        assert_eq!(conn.count("after"), 0);
        assert_eq!(conn.count("later"), 0);
        let reason = result.reason.unwrap();
        assert!(reason.starts_with("module \"bootstrap\""));
        assert!(reason.contains("task \"init\" failed on n1"));
    }

    #[test]
    fn test_empty_host_set_succeeds() {
        let mut inv = fleet(&["n1"]);
        inv.add_group("etcd", Group::default());
        let factory = MockFactory::new();
        let pipeline = single(Task::new("noop", Command::new("noop")).hosts(["etcd"]));

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(result.succeeded, 1);
    }

    #[test]
    fn test_module_skip_conditions() {
        let mut inv = fleet(&["n1"]);
        inv.add_group("workers", Group::default());
        let factory = MockFactory::new();
        let pipeline = Pipeline::new("test")
            .module(
                Module::new("join")
                    .skip_when(GroupEmpty("workers".into()))
                    .task(Task::new("join", Command::new("join")).hosts(["workers"])),
            )
            .module(
                Module::new("mark").task(
                    Task::new("mark", SetFact {
                        scope: Scope::Pipeline,
                        key: "upgraded".into(),
                        value: json!(true),
                    })
                    .hosts(["n1"]),
                ),
            )
            .module(
                Module::new("upgrade")
                    .skip_when(PipelineCacheEquals {
                        key: "upgraded".into(),
                        value: json!(true),
                    })
                    .task(Task::new("upgrade", Command::new("upgrade")).hosts(["n1"])),
            );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(result.total, 1);
        assert_eq!(factory.connector("n1").count("upgrade"), 0);
    }

    #[test]
    fn test_gated_hosts_are_skipped() {
        let inv = fleet(&["n1", "n2", "n3"]);
        let factory = MockFactory::new();
        let pipeline = Pipeline::new("test").module(
            Module::new("m")
                .task(
                    Task::new("bootstrap", Command::new("kubeadm init"))
                        .hosts(["k8s_cluster"])
                        .prepare(FirstHost),
                )
                .task(
                    Task::new("never", Command::new("never"))
                        .hosts(["k8s_cluster"])
                        .prepare(CacheEquals {
                            scope: Scope::Pipeline,
                            key: "missing".into(),
                            value: json!(1),
                        }),
                ),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(factory.hosts_running("kubeadm init"), vec!["n1"]);
        assert_eq!((result.succeeded, result.skipped), (1, 1));
    }

    #[test]
    fn test_cancel_stops_dispatch() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let cancel = CancelToken::new();
        let trip = cancel.clone();
        let pipeline = Pipeline::new("test")
            .module(
                Module::new("first").task(
                    Task::new(
                        "cancel",
                        action::from_fn("cancel", move |_: &HostContext<'_>| {
                            trip.cancel();
                            Ok(())
                        }),
                    )
                    .hosts(["n1"]),
                ),
            )
            .module(Module::new("second").task(Task::new("after", Command::new("after")).hosts(["n1"])));

        let result = pipeline.run_with(&inv, &factory, &NoProgress, &cancel);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(result.reason.as_deref(), Some("pipeline cancelled"));
        assert_eq!(factory.connector("n1").count("after"), 0);
    }

    #[test]
    fn test_parallel_fan_out_reaches_every_host() {
        let hosts = ["n1", "n2", "n3", "n4", "n5"];
        let inv = fleet(&hosts);
        let factory = MockFactory::new();
        let pipeline =
            single(Task::new("pull", Command::new("crictl pull")).hosts(["k8s_cluster"]).parallel())
                .concurrency(2);

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(factory.hosts_running("crictl pull"), hosts);
    }

    #[test]
    fn test_serial_task_stops_at_first_failure() {
        let inv = fleet(&["n1", "n2", "n3"]);
        let factory = MockFactory::new().fail(Some("n2"), "drain", 1, "pdb");
        let pipeline = single(Task::new("drain", Command::new("drain")).hosts(["k8s_cluster"]));

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(factory.hosts_running("drain"), vec!["n1", "n2"]);
    }

    #[test]
    fn test_serial_ignored_failure_keeps_dispatching() {
        let inv = fleet(&["n1", "n2", "n3"]);
        let factory = MockFactory::new().fail(Some("n1"), "swapoff", 1, "no swap");
        let pipeline = single(
            Task::new("swapoff", Command::new("swapoff -a"))
                .hosts(["k8s_cluster"])
                .ignore_error(),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(result.ignored, 1);
        assert_eq!(factory.hosts_running("swapoff"), vec!["n1", "n2", "n3"]);
        assert_eq!(result.failures[0].hosts.len(), 1);
    }

    #[test]
    fn test_run_once_uses_first_host() {
        let inv = fleet(&["n1", "n2", "n3"]);
        let factory = MockFactory::new();
        let pipeline = single(
            Task::new("token", Command::new("kubeadm token create"))
                .hosts(["k8s_cluster"])
                .parallel()
                .run_once(),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(factory.hosts_running("kubeadm token"), vec!["n1"]);
    }

    #[test]
    fn test_loop_runs_action_per_item() {
        let mut inv = fleet(&["n1"]);
        inv.vars_mut()["modules"] = json!(["overlay", "br_netfilter"]);
        let factory = MockFactory::new();
        let pipeline = Pipeline::new("test").module(
            Module::new("m")
                .task(
                    Task::new("literal", Command::new("modprobe {{ item }}"))
                        .hosts(["n1"])
                        .with_loop(json!(["ip_vs", "{{ inventory_name }}-extra"])),
                )
                .task(
                    Task::new("from-vars", Command::new("echo {{ item }} > /etc/modules-load.d/k8s.conf"))
                        .hosts(["n1"])
                        .with_loop("modules"),
                ),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success(), "{result}");
        let calls = factory.connector("n1").calls();
        assert_eq!(
            calls,
            vec![
                "modprobe ip_vs",
                "modprobe n1-extra",
                "echo overlay > /etc/modules-load.d/k8s.conf",
                "echo br_netfilter > /etc/modules-load.d/k8s.conf",
            ]
        );
    }

    #[test]
    fn test_loop_over_non_list_fails_without_retry() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let pipeline = single(
            Task::new("bad", Command::new("echo {{ item }}"))
                .hosts(["n1"])
                .with_loop("inventory_name")
                .retry(RetryPolicy::new(3, Duration::ZERO)),
        );

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert!(factory.connector("n1").calls().is_empty());
        assert!(result.reason.unwrap().contains("loop must be a list"));
    }

    #[test]
    fn test_failed_when_reads_registered_output() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new().respond("kubectl get nodes", "NotReady");
        let pipeline = single(
            Task::new("check", Command::new("kubectl get nodes").register("nodes"))
                .hosts(["n1"])
                .failed_when("'NotReady' in facts.nodes.stdout"),
        );

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert!(result.reason.unwrap().contains("failed_when condition met"));
    }

    #[test]
    fn test_until_retries_until_condition_holds() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let pipeline = single(
            Task::new(
                "wait-ready",
                action::from_fn("poll", move |ctx: &HostContext<'_>| {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    ctx.connector.cache().set("ready", n >= 3);
                    Ok(())
                }),
            )
            .hosts(["n1"])
            .until("facts.ready")
            .retry(RetryPolicy::new(5, Duration::ZERO)),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success(), "{result}");
        assert_eq!(polls.load(Ordering::SeqCst), 3);

        let never = single(
            Task::new("never", Command::new("true"))
                .hosts(["n1"])
                .until("false")
                .retry(RetryPolicy::new(2, Duration::ZERO)),
        );
        let result = never.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(factory.connector("n1").count("true"), 3);
    }

    #[test]
    fn test_rescue_and_always() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new().fail(None, "kubeadm init", 1, "timeout");
        let pipeline = Pipeline::new("test")
            .module(
                Module::new("init")
                    .task(Task::new("init", Command::new("kubeadm init")).hosts(["n1"]))
                    .task(Task::new("after", Command::new("after")).hosts(["n1"]))
                    .rescue(Task::new("reset", Command::new("kubeadm reset -f")).hosts(["n1"]))
                    .always(Task::new("cleanup", Command::new("rm -rf /tmp/kubeadm")).hosts(["n1"])),
            )
            .module(Module::new("next").task(Task::new("later", Command::new("later")).hosts(["n1"])));

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        let calls = factory.connector("n1").calls();
        assert_eq!(calls, vec!["kubeadm init", "kubeadm reset -f", "rm -rf /tmp/kubeadm"]);
        assert!(result.reason.unwrap().contains("task \"init\" failed"));
        assert_eq!((result.total, result.failed, result.succeeded), (3, 1, 2));
    }

    #[test]
    fn test_always_runs_after_success() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let pipeline = Pipeline::new("test").module(
            Module::new("m")
                .task(Task::new("init", Command::new("init")).hosts(["n1"]))
                .rescue(Task::new("reset", Command::new("reset")).hosts(["n1"]))
                .always(Task::new("report", Command::new("report")).hosts(["n1"])),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(factory.connector("n1").calls(), vec!["init", "report"]);
    }

    #[test]
    fn test_select_tags() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let build = || {
            Pipeline::new("test")
                .module(
                    Module::new("etcd")
                        .task(Task::new("etcd", Command::new("etcd")).hosts(["n1"]).tags(["etcd"]))
                        .task(Task::new("facts", Command::new("facts")).hosts(["n1"]).tags(["always"])),
                )
                .module(
                    Module::new("cni").task(Task::new("cni", Command::new("cni")).hosts(["n1"]).tags(["network"])),
                )
                .module(
                    Module::new("debug").task(Task::new("dump", Command::new("dump")).hosts(["n1"]).tags(["never"])),
                )
        };

        let all = build().select_tags(&[], &[]);
        assert_eq!(all.modules.len(), 2);

        let etcd = build().select_tags(&["etcd".to_string()], &[]);
        assert_eq!(etcd.modules.len(), 1);
        assert!(etcd.run(&inv, &factory).is_success());
        assert_eq!(factory.connector("n1").calls(), vec!["etcd", "facts"]);

        let skipped = build().select_tags(&["all".to_string()], &["etcd".to_string()]);
        let names: Vec<&str> = skipped.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["etcd", "cni"]);
        assert_eq!(skipped.modules[0].tasks.len(), 1);
    }

    #[test]
    fn test_serial_module_runs_in_batches() {
        let inv = fleet(&["n1", "n2", "n3", "n4", "n5"]);
        let factory = MockFactory::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let pipeline = Pipeline::new("test").module(
            Module::new("upgrade")
                .serial(vec![SerialEntry::Count(1), SerialEntry::Percent(50)])
                .task(
                    Task::new(
                        "record",
                        action::from_fn("record", move |ctx: &HostContext<'_>| {
                            seen.lock().unwrap().push(ctx.hosts.to_vec());
                            Ok(())
                        }),
                    )
                    .hosts(["k8s_cluster"])
                    .prepare(FirstHost),
                ),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(result.total, 3);
        let batches = order.lock().unwrap().clone();
        assert_eq!(
            batches,
            vec![vec!["n1".to_string()], vec!["n2".into(), "n3".into(), "n4".into()], vec!["n5".into()]]
        );
    }

    #[test]
    fn test_local_task_runs_once_on_controller() {
        let inv = fleet(&["n1", "n2"]);
        let factory = MockFactory::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pipeline = single(
            Task::new(
                "render",
                action::from_fn("render", move |ctx: &HostContext<'_>| {
                    assert_eq!(ctx.host, inventory::LOCALHOST);
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .hosts(["k8s_cluster"])
            .local(),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_caches_flow_between_tasks() {
        let inv = fleet(&["n1", "n2"]);
        let factory = MockFactory::new().respond("kubeadm token create", "abc.123\n");
        let pipeline = Pipeline::new("test").module(
            Module::new("join")
                .task(
                    Task::new("token", Command::new("kubeadm token create").register("token"))
                        .hosts(["k8s_cluster"])
                        .prepare(FirstHost),
                )
                .task(
                    Task::new(
                        "share",
                        action::from_fn("share", |ctx: &HostContext<'_>| {
                            let token = ctx.require(Scope::Host, "token")?;
                            ctx.pipeline_cache.set("token", token["stdout"].clone());
                            Ok(())
                        }),
                    )
                    .hosts(["k8s_cluster[0]"]),
                )
                .task(
                    Task::new("join", Command::new("kubeadm join --token {{ pipeline.token }}"))
                        .hosts(["k8s_cluster"])
                        .parallel(),
                ),
        );

        let result = pipeline.run(&inv, &factory);
        assert!(result.is_success(), "{result}");
        assert_eq!(factory.connector("n2").count("kubeadm join --token abc.123"), 1);
    }

    #[test]
    fn test_missing_cache_entry_aborts_even_when_ignored() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let pipeline = single(
            Task::new(
                "needs-token",
                action::from_fn("needs-token", |ctx: &HostContext<'_>| {
                    ctx.require(Scope::Pipeline, "token").map(|_| ())
                }),
            )
            .hosts(["n1"])
            .ignore_error(),
        );

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(result.failed, 1);
        assert!(
            result
                .reason
                .unwrap()
                .contains("pipeline cache has no entry \"token\"")
        );
    }

    #[test]
    fn test_out_of_range_host_index_fails_task() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let pipeline = single(Task::new("second", Command::new("true")).hosts(["k8s_cluster[1]"]));

        let result = pipeline.run(&inv, &factory);
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(result.failed, 1);
        assert!(result.reason.unwrap().contains("task \"second\" failed on -"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].task, "second");
        let ledger = &result.failures[0].hosts[0];
        assert_eq!(ledger.host, "-");
        assert!(ledger.stderr.contains("out of range"), "{}", ledger.stderr);
    }

    #[test]
    fn test_runs_do_not_share_pipeline_cache() {
        let inv = fleet(&["n1"]);
        let factory = MockFactory::new();
        let pipeline = Pipeline::new("test")
            .module(
                Module::new("once")
                    .skip_when(PipelineCacheEquals {
                        key: "done".into(),
                        value: json!(true),
                    })
                    .task(Task::new("init", Command::new("init")).hosts(["n1"])),
            )
            .module(
                Module::new("mark").task(
                    Task::new("mark", SetFact {
                        scope: Scope::Pipeline,
                        key: "done".into(),
                        value: json!(true),
                    })
                    .hosts(["n1"]),
                ),
            );

        assert!(pipeline.run(&inv, &factory).is_success());
        assert!(pipeline.run(&inv, &factory).is_success());
        assert_eq!(factory.connector("n1").count("init"), 2);
    }

    #[test]
    fn test_task_status_recorded_per_batch() {
        let inv = fleet(&["n1", "n2"]);
        let factory = MockFactory::new();
        let pipeline = Pipeline::new("test").module(
            Module::new("rolling")
                .serial(vec![SerialEntry::Count(1)])
                .task(Task::new("restart", Command::new("restart")).hosts(["k8s_cluster"])),
        );

        let result = pipeline.run(&inv, &factory);
        assert_eq!((result.total, result.succeeded), (2, 2));
        assert!(result.failures.is_empty());
        assert_eq!(factory.hosts_running("restart"), vec!["n1", "n2"]);
    }
}
