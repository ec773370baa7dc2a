//! RunFFT: a GPU FFT plan compiler and Stockham kernel generator.
//!
//! The library turns a transform request into an executable plan (a tree
//! of compute nodes, generated device kernels and an ordered launch
//! schedule) and drives an embedder-supplied accelerator harness through
//! it. Compiled code objects are cached on disk keyed by kernel identity,
//! GPU architecture, toolchain version and generator hash.
//!
//! ```no_run
//! use runfft::{FftContext, FftRequest};
//!
//! let ctx = FftContext::new();
//! let plan = ctx.plan(FftRequest {
//!     length: vec![4096],
//!     ..Default::default()
//! })?;
//! println!("{} launches, {} scratch bytes", plan.schedule.len(), plan.scratch_bytes());
//! # Ok::<(), runfft::FftError>(())
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use runfft_cache::{CacheKey, RtcCache};
pub use runfft_codegen::{generate_kernel_source, generator_hash, kernel_name};
pub use runfft_core::harness::{
    resolve_buffers, validate_exec_params, BufferId, DeviceHarness, ExecParams, ResolvedLaunch,
    RtcCompiler, StreamId,
};
pub use runfft_core::{
    last_diagnostic, ArrayLayout, BufferRef, Direction, FftDescriptor, FftError, FftRequest,
    FftStatus, KernelSpec, LaunchRecord, Placement, Plan, Precision, Scheme, StepKind,
    TransformKind,
};
pub use runfft_core::{schedule, token};

static DEFAULT_CACHE: Lazy<Arc<RtcCache>> = Lazy::new(|| Arc::new(RtcCache::open_default()));

/// The process-wide default code-object cache.
pub fn default_cache() -> Arc<RtcCache> {
    DEFAULT_CACHE.clone()
}

/// Planner front end: owns the code-object cache handle and, optionally,
/// the runtime-compilation toolchain. Harnesses without a toolchain (the
/// host interpreter used by the test oracle) execute from the schedule
/// alone.
pub struct FftContext {
    cache: Arc<RtcCache>,
    compiler: Option<Box<dyn RtcCompiler>>,
}

impl Default for FftContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FftContext {
    /// A context backed by the process-wide default cache.
    pub fn new() -> FftContext {
        FftContext {
            cache: default_cache(),
            compiler: None,
        }
    }

    /// A context with an explicit cache handle.
    pub fn with_cache(cache: Arc<RtcCache>) -> FftContext {
        FftContext {
            cache,
            compiler: None,
        }
    }

    pub fn set_compiler(&mut self, compiler: Box<dyn RtcCompiler>) {
        self.compiler = Some(compiler);
    }

    pub fn cache(&self) -> &RtcCache {
        &self.cache
    }

    /// Build a plan from a raw request (`plan_create`).
    pub fn plan(&self, request: FftRequest) -> Result<Plan, FftError> {
        Plan::new(request.normalize()?)
    }

    /// Fail when the code-object cache was disabled at open (corrupt or
    /// unreadable file). Kernel execution recovers from that silently by
    /// recompiling; callers that share or persist code objects get the
    /// reason here.
    fn ensure_cache_usable(&self) -> Result<(), FftError> {
        if self.cache.is_disabled() {
            let reason = self
                .cache
                .disabled_reason()
                .unwrap_or("code object cache disabled")
                .to_string();
            return Err(FftError::cache_unavailable(reason));
        }
        Ok(())
    }

    /// Export the code-object cache as a self-contained blob for sharing
    /// between processes.
    pub fn export_cache(&self) -> Result<Vec<u8>, FftError> {
        self.ensure_cache_usable()?;
        self.cache
            .serialize()
            .map_err(|e| FftError::cache_unavailable(e.to_string()))
    }

    /// Merge a blob produced by [`FftContext::export_cache`] into this
    /// context's cache.
    pub fn import_cache(&self, blob: &[u8]) -> Result<(), FftError> {
        self.ensure_cache_usable()?;
        self.cache
            .deserialize(blob)
            .map_err(|e| FftError::cache_unavailable(e.to_string()))
    }

    /// Ensure a code object exists for one kernel of the plan, consulting
    /// the cache before invoking the toolchain.
    fn code_object(&self, spec: &KernelSpec) -> Result<Vec<u8>, FftError> {
        let Some(compiler) = &self.compiler else {
            return Ok(Vec::new());
        };
        let name = kernel_name(spec);
        let key = CacheKey {
            kernel_name: name.clone(),
            gpu_arch: compiler.gpu_arch(),
            toolchain_version: compiler.toolchain_version(),
            generator_sum: generator_hash(spec),
        };
        if let Some(code) = self.cache.get(&key) {
            log::debug!("code object cache hit: {name}");
            return Ok(code);
        }
        let source = generate_kernel_source(spec);
        let code = compiler
            .compile(&name, &source)
            .map_err(|e| FftError::compile_failure(format!("{name}: {e}")))?;
        self.cache.put(key, code.clone());
        Ok(code)
    }

    /// Submit the plan's schedule to the harness in order
    /// (`plan_execute`).
    pub fn execute(
        &self,
        plan: &Plan,
        harness: &dyn DeviceHarness,
        params: &ExecParams,
    ) -> Result<(), FftError> {
        validate_exec_params(plan, params)?;
        harness
            .upload_twiddles(plan)
            .map_err(|e| FftError::device_failure(format!("twiddle upload failed: {e}")))?;
        for record in &plan.schedule {
            let code = self.code_object(plan.kernel(record.kernel))?;
            let (input, output) = resolve_buffers(record, params);
            let launch = ResolvedLaunch {
                record,
                input,
                output,
                code_object: &code,
            };
            harness
                .launch(plan, &launch, params.stream)
                .map_err(|e| FftError::device_failure(e.to_string()))?;
        }
        harness
            .synchronize(params.stream)
            .map_err(|e| FftError::device_failure(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingCompiler {
        compiles: AtomicUsize,
    }

    impl RtcCompiler for CountingCompiler {
        fn gpu_arch(&self) -> String {
            "gfx90a".into()
        }
        fn toolchain_version(&self) -> u32 {
            600
        }
        fn compile(&self, _name: &str, source: &str) -> anyhow::Result<Vec<u8>> {
            self.compiles.fetch_add(1, Ordering::Relaxed);
            Ok(source.as_bytes().to_vec())
        }
    }

    struct NullHarness {
        launches: Mutex<Vec<String>>,
    }

    impl DeviceHarness for NullHarness {
        fn launch(
            &self,
            plan: &Plan,
            launch: &ResolvedLaunch<'_>,
            _stream: StreamId,
        ) -> anyhow::Result<()> {
            self.launches
                .lock()
                .unwrap()
                .push(kernel_name(plan.kernel(launch.record.kernel)));
            Ok(())
        }
    }

    fn temp_cache(tag: &str) -> (Arc<RtcCache>, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "runfft-ctx-test-{}-{tag}.bin",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        (
            Arc::new(RtcCache::open(&path, runfft_cache::DEFAULT_MAX_BYTES)),
            path,
        )
    }

    fn exec_params() -> ExecParams {
        ExecParams {
            input: vec![1],
            output: vec![1],
            scratch: [2, 3],
            stream: 0,
        }
    }

    #[test]
    fn repeated_execution_compiles_each_kernel_once() {
        let (cache, path) = temp_cache("once");
        let mut ctx = FftContext::with_cache(cache);
        ctx.set_compiler(Box::new(CountingCompiler {
            compiles: AtomicUsize::new(0),
        }));
        let plan = ctx
            .plan(FftRequest {
                length: vec![64],
                placement: Placement::InPlace,
                ..Default::default()
            })
            .unwrap();
        let harness = NullHarness {
            launches: Mutex::new(Vec::new()),
        };
        ctx.execute(&plan, &harness, &exec_params()).unwrap();
        ctx.execute(&plan, &harness, &exec_params()).unwrap();
        assert_eq!(harness.launches.lock().unwrap().len(), 2);
        // One compile, one hit.
        assert_eq!(ctx.cache().counters().0, 1);
        assert_eq!(ctx.cache().len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn serialized_cache_seeds_a_fresh_context() {
        let (cache_a, pa) = temp_cache("seed-a");
        let mut ctx_a = FftContext::with_cache(cache_a);
        ctx_a.set_compiler(Box::new(CountingCompiler {
            compiles: AtomicUsize::new(0),
        }));
        let plan = ctx_a
            .plan(FftRequest {
                length: vec![64],
                placement: Placement::InPlace,
                ..Default::default()
            })
            .unwrap();
        let harness = NullHarness {
            launches: Mutex::new(Vec::new()),
        };
        ctx_a.execute(&plan, &harness, &exec_params()).unwrap();
        let blob = ctx_a.export_cache().unwrap();

        let (cache_b, pb) = temp_cache("seed-b");
        let mut ctx_b = FftContext::with_cache(cache_b);
        ctx_b.import_cache(&blob).unwrap();
        ctx_b.set_compiler(Box::new(CountingCompiler {
            compiles: AtomicUsize::new(0),
        }));
        ctx_b.execute(&plan, &harness, &exec_params()).unwrap();
        // The seeded cache serves the kernel without recompiling.
        assert_eq!(ctx_b.cache().counters(), (1, 0));
        let _ = std::fs::remove_file(pa);
        let _ = std::fs::remove_file(pb);
    }

    #[test]
    fn disabled_cache_reports_cache_unavailable() {
        let path = std::env::temp_dir().join(format!(
            "runfft-ctx-corrupt-{}.bin",
            std::process::id()
        ));
        std::fs::write(&path, b"definitely not a cache file").unwrap();
        let cache = Arc::new(RtcCache::open(&path, runfft_cache::DEFAULT_MAX_BYTES));
        assert!(cache.is_disabled());
        let ctx = FftContext::with_cache(cache);
        let err = ctx.export_cache().unwrap_err();
        assert_eq!(err.status(), FftStatus::CacheUnavailable);
        assert!(matches!(err, FftError::CacheUnavailable(_)));
        assert!(ctx.import_cache(&[]).is_err());

        // Kernel execution still recovers locally: plans run, nothing is
        // cached.
        let plan = ctx
            .plan(FftRequest {
                length: vec![64],
                placement: Placement::InPlace,
                ..Default::default()
            })
            .unwrap();
        let harness = NullHarness {
            launches: Mutex::new(Vec::new()),
        };
        ctx.execute(&plan, &harness, &exec_params()).unwrap();
        assert_eq!(ctx.cache().len(), 0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn corrupt_blob_import_reports_cache_unavailable() {
        let ctx = FftContext::with_cache(Arc::new(RtcCache::in_memory(
            runfft_cache::DEFAULT_MAX_BYTES,
        )));
        let err = ctx.import_cache(b"garbage blob").unwrap_err();
        assert_eq!(err.status(), FftStatus::CacheUnavailable);
        assert!(last_diagnostic().contains("corrupt") || last_diagnostic().contains("short"));
    }

    #[test]
    fn execute_without_a_compiler_still_launches() {
        let (cache, path) = temp_cache("nocompiler");
        let ctx = FftContext::with_cache(cache);
        let plan = ctx
            .plan(FftRequest {
                length: vec![4096],
                placement: Placement::InPlace,
                ..Default::default()
            })
            .unwrap();
        let harness = NullHarness {
            launches: Mutex::new(Vec::new()),
        };
        ctx.execute(&plan, &harness, &exec_params()).unwrap();
        assert_eq!(harness.launches.lock().unwrap().len(), 2);
        let _ = std::fs::remove_file(path);
    }
}
