//! The render engine and its hole-punch orchestration.
//!
//! `Engine` owns the configuration the original design kept in process
//! globals: the cache store, the full-render TTL, the partial feeder, and
//! the helper registry. Configuration is fixed at build time, so sharing
//! one engine across concurrent renders needs no further synchronization.
//!
//! A render splits into a cached *skeleton* — the static output with
//! placeholders left in place — and per-request *holes* that are
//! re-rendered concurrently on every call and spliced back into exact byte
//! positions. Two cache namespaces cover the two tiers: `ast:` records
//! hold compiled programs and never expire; `full:` records hold a
//! skeleton plus hole descriptors and expire after the TTL.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use rayon::prelude::*;

use crate::cache::TemplateCache;
use crate::cache_key::{clean_file_path, generate_ast_key, generate_full_key};
use crate::compiler::{self, Program};
use crate::context::{Context, MetaKey};
use crate::error::RenderError;
use crate::helpers::{HelperRegistry, PartialFeeder};
use crate::types::{HoleMarker, Template, cleared_holes};

/// Template-file suffixes eligible for skeleton caching.
const TEMPLATE_SUFFIXES: [&str; 2] = [".plush.html", ".plush"];

/// A configured rendering engine.
///
/// # Example
///
/// ```
/// use plush::{Context, Engine};
///
/// let engine = Engine::new();
/// let ctx = Context::new();
/// ctx.set("name", "mark");
///
/// let out = engine.render("<p><%= name %></p>", &ctx).unwrap();
/// assert_eq!(out, "<p>mark</p>");
/// ```
#[derive(Builder)]
pub struct Engine {
    /// Template record store. Rendering works uncached without one.
    cache: Option<Arc<dyn TemplateCache>>,

    /// Lifetime of full-render records. AST records never expire.
    #[builder(default = Duration::from_secs(60))]
    cache_ttl: Duration,

    /// Source loader for `partial(...)` calls.
    feeder: Option<PartialFeeder>,

    /// Helper table; defaults to the core set.
    #[builder(default)]
    helpers: HelperRegistry,
}

/// Outcome of a cache probe. Misses and errors both fall through to a
/// fresh render; `Stale` additionally forces the refreshed result to
/// overwrite the record.
enum CacheProbe {
    Hit(String),
    Stale,
    Miss,
}

impl Engine {
    /// Create an engine with default settings and no cache.
    pub fn new() -> Self {
        Engine::builder().build()
    }

    /// The helper registry.
    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    /// Mutable access to the helper registry, for registering helpers
    /// before the engine is shared.
    pub fn helpers_mut(&mut self) -> &mut HelperRegistry {
        &mut self.helpers
    }

    pub(crate) fn feeder(&self) -> Option<&PartialFeeder> {
        self.feeder.as_ref()
    }

    /// Render template source against a context.
    pub fn render(&self, source: &str, ctx: &Context) -> Result<String, RenderError> {
        let is_hole = is_hole_pass(ctx);

        // Holes skip filename resolution entirely: re-probing the cache
        // from inside a hole re-render would recurse forever.
        let filename = if is_hole {
            String::new()
        } else {
            ctx.meta(MetaKey::TemplateFile)
                .map(|file| clean_file_path(&file))
                .unwrap_or_default()
        };

        let mut force_refresh = false;
        if !is_hole && !filename.is_empty() {
            match self.probe_cache(&filename, ctx) {
                CacheProbe::Hit(out) => return Ok(out),
                CacheProbe::Stale => force_refresh = true,
                CacheProbe::Miss => {}
            }
        }

        let (program, from_cache) = self.parse(source, &filename, ctx)?;
        let (skeleton, mut holes) = compiler::exec(&program, ctx, self)?;

        // Only recognized template files participate in skeleton caching;
        // for anything else holes are inert and the evaluator's output is
        // returned untouched.
        if !is_template_file(&filename) {
            return Ok(skeleton);
        }

        if !holes.is_empty() && (!from_cache || force_refresh) && self.cache_allowed(ctx) {
            if let Some(cache) = &self.cache {
                let record = Template::full_record(skeleton.clone(), &holes);
                cache.set(&generate_full_key(&filename, ctx), Arc::new(record));
            }
        }

        if !is_hole && !holes.is_empty() {
            self.fill_holes(&mut holes, ctx);
            return splice(&skeleton, &holes);
        }
        Ok(skeleton)
    }

    /// Render template source read from `input`.
    pub fn render_reader(&self, mut input: impl Read, ctx: &Context) -> Result<String, RenderError> {
        let mut source = String::new();
        input.read_to_string(&mut source)?;
        self.render(&source, ctx)
    }

    /// Evaluate a compiled program, returning the skeleton and its hole
    /// markers without filling them.
    pub fn execute(
        &self,
        program: &Program,
        ctx: &Context,
    ) -> Result<(String, Vec<HoleMarker>), RenderError> {
        compiler::exec(program, ctx, self)
    }

    /// Compile source, consulting and populating the AST cache when the
    /// filename names a template file. AST records are stored independent
    /// of the TTL.
    fn parse(
        &self,
        source: &str,
        filename: &str,
        ctx: &Context,
    ) -> Result<(Arc<Program>, bool), RenderError> {
        let cacheable =
            !filename.is_empty() && is_template_file(filename) && self.cache_allowed(ctx);
        if cacheable {
            if let Some(cache) = &self.cache {
                let ast_key = generate_ast_key(filename);
                if let Some(record) = cache.get(&ast_key) {
                    if let Some(program) = &record.program {
                        return Ok((Arc::clone(program), true));
                    }
                }
                let program = Arc::new(compiler::parse(source)?);
                cache.set(
                    &ast_key,
                    Arc::new(Template::ast_record(Arc::clone(&program))),
                );
                return Ok((program, false));
            }
        }
        Ok((Arc::new(compiler::parse(source)?), false))
    }

    /// Try to serve from the full-render cache.
    ///
    /// Fails fast unless an AST record exists for the filename, so
    /// deleting the AST key forces a recompile even while a full record
    /// lingers. A fresh full record is served by deep-copying its holes,
    /// filling them concurrently, and splicing.
    fn probe_cache(&self, filename: &str, ctx: &Context) -> CacheProbe {
        if !self.cache_allowed(ctx) {
            return CacheProbe::Miss;
        }
        let Some(cache) = &self.cache else {
            return CacheProbe::Miss;
        };
        if cache.get(&generate_ast_key(filename)).is_none() {
            return CacheProbe::Miss;
        }
        let Some(record) = cache.get(&generate_full_key(filename, ctx)) else {
            return CacheProbe::Miss;
        };
        if record.skeleton.is_empty() || record.holes.is_empty() {
            return CacheProbe::Miss;
        }
        let fresh = record
            .last_cached
            .is_some_and(|at| at.elapsed() <= self.cache_ttl);
        if !fresh {
            return CacheProbe::Stale;
        }
        let mut holes = cleared_holes(&record.holes);
        self.fill_holes(&mut holes, ctx);
        match splice(&record.skeleton, &holes) {
            Ok(out) => CacheProbe::Hit(out),
            Err(_) => CacheProbe::Miss,
        }
    }

    /// Re-render every hole concurrently, one task per marker.
    ///
    /// Each task owns exactly its marker slot, so completion order cannot
    /// disturb splice order; the parallel iterator is the join barrier. A
    /// failing hole reports its error inline instead of aborting siblings.
    fn fill_holes(&self, holes: &mut [HoleMarker], ctx: &Context) {
        if holes.is_empty() {
            return;
        }
        let batch = ctx.fork();
        let current_file = batch.meta(MetaKey::TemplateFile);
        let base = current_file.as_deref().map(base_name).unwrap_or_default();
        if let Some(file) = &current_file {
            batch.set_meta(MetaKey::HoleBatch, file.clone());
        }
        holes.par_iter_mut().for_each(|hole| {
            let child = batch.fork();
            hole.content = match self.render(&hole.input, &child) {
                Ok(content) => content,
                Err(err) => format!("{err} in {base}"),
            };
        });
    }

    fn cache_allowed(&self, ctx: &Context) -> bool {
        self.cache.is_some() && ctx.meta(MetaKey::DisableCache).is_none()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

/// Splice hole contents into a skeleton.
///
/// Markers must be non-overlapping and sorted by `start`, which evaluation
/// guarantees. A marker carrying a captured failure aborts the splice.
fn splice(skeleton: &str, holes: &[HoleMarker]) -> Result<String, RenderError> {
    let mut out = String::with_capacity(skeleton.len());
    let mut last = 0;
    for hole in holes {
        if let Some(message) = &hole.err {
            return Err(RenderError::HoleFill {
                message: message.clone(),
            });
        }
        out.push_str(&skeleton[last..hole.start]);
        out.push_str(&hole.content);
        last = hole.end;
    }
    out.push_str(&skeleton[last..]);
    Ok(out)
}

/// Whether `filename` names a template file eligible for skeleton caching.
pub fn is_template_file(filename: &str) -> bool {
    TEMPLATE_SUFFIXES
        .iter()
        .any(|suffix| filename.ends_with(suffix))
}

/// A context is a hole sub-render when the batch sentinel matches the
/// current file key; the sentinel is stamped only when forking for hole
/// re-rendering.
fn is_hole_pass(ctx: &Context) -> bool {
    match (ctx.meta(MetaKey::HoleBatch), ctx.meta(MetaKey::TemplateFile)) {
        (Some(sentinel), Some(file)) => sentinel == file,
        _ => false,
    }
}

/// Final path element of a file key.
fn base_name(path: &str) -> String {
    match path.rfind('/') {
        Some(slash) => path[slash + 1..].to_string(),
        None => path.to_string(),
    }
}
