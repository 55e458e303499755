//! The controller: window state, tid gating, and choreography between the
//! cache, a slow backend and a synchronous UI.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::ChartCache;
use crate::error::Result;
use crate::time::{num_datapoints, resolution_for, Resolution};

/// The backend the controller fetches from. `request` only initiates the
/// fetch; the reply arrives later, out of band, via [`Controller::receive`].
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn request(&self, start: i64, end: i64, resolution: Resolution);
}

/// The UI the controller renders to. `render` is a full replacement of the
/// displayed samples; `None` entries mean "no data yet".
pub trait Ui: Send + Sync {
    fn render(&self, samples: Vec<Option<f64>>);
}

/// `(start, end, resolution_seconds)` — the key both request maps are
/// keyed by.
type ReqKey = (i64, i64, i64);

fn req_key(start: i64, end: i64, resolution: Resolution) -> ReqKey {
    (start, end, resolution.seconds())
}

/// Monotonically increasing identifier for one UI-initiated task.
pub type Tid = u64;

pub struct Controller {
    ui: Arc<dyn Ui>,
    backend: Arc<dyn Backend>,
    start: i64,
    end: i64,
    cache: ChartCache,
    cur_tid: Tid,
    backend_reqs: HashMap<ReqKey, Tid>,
    ui_reqs: HashMap<Tid, ReqKey>,
}

impl Controller {
    /// Constructs the controller, synchronously renders `[None; N]` to the
    /// UI, then kicks off the initial backend fetch for `[start, end)`.
    pub async fn create(
        ui: Arc<dyn Ui>,
        backend: Arc<dyn Backend>,
        start: i64,
        end: i64,
        cache: Option<ChartCache>,
    ) -> Result<Controller> {
        let resolution = resolution_for(end - start)?;
        let mut controller = Controller {
            ui,
            backend,
            start,
            end,
            cache: cache.unwrap_or_default(),
            cur_tid: 1,
            backend_reqs: HashMap::new(),
            ui_reqs: HashMap::new(),
        };

        let filler = vec![None; num_datapoints(end - start, Some(resolution))? as usize];
        controller.respond_ui(filler, start, end, resolution);
        controller.record_backend_req(start, end, resolution, controller.cur_tid);

        controller.backend.request(start, end, resolution).await;

        controller.cur_tid += 1;
        Ok(controller)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn cache(&self) -> &ChartCache {
        &self.cache
    }

    pub fn cur_tid(&self) -> Tid {
        self.cur_tid
    }

    fn record_ui_req(&mut self, tid: Tid, key: ReqKey) {
        self.ui_reqs.insert(tid, key);
    }

    fn record_backend_req(&mut self, start: i64, end: i64, resolution: Resolution, tid: Tid) {
        self.backend_reqs.insert(req_key(start, end, resolution), tid);
    }

    fn respond_ui(&mut self, samples: Vec<Option<f64>>, start: i64, end: i64, resolution: Resolution) {
        self.record_ui_req(self.cur_tid, req_key(start, end, resolution));
        self.ui.render(samples);
    }

    async fn request_data(&mut self, start: i64, end: i64, resolution: Resolution) {
        self.record_backend_req(start, end, resolution, self.cur_tid);
        self.backend.request(start, end, resolution).await;
    }

    /// Moves the left edge of the window. Mirror image of [`Self::set_end`];
    /// placeholders are prepended rather than appended.
    pub async fn set_start(&mut self, new_start: i64) -> Result<()> {
        if new_start == self.start {
            return Ok(());
        }
        let new_resolution = resolution_for((self.end - new_start).abs())?;
        let missing = self.cache.missing_ranges(new_start, self.end, new_resolution)?;

        if missing.is_empty() {
            let samples = as_optional(self.cache.query(new_start, self.end, new_resolution.seconds())?);
            self.respond_ui(samples, new_start, self.end, new_resolution);
        } else {
            let filler_len = num_datapoints((self.start - new_start).max(0), Some(new_resolution))? as usize;
            let filler = vec![None; filler_len];
            let from_cache_start = self.start.max(new_start);
            let from_cache = if from_cache_start < self.end {
                as_optional(self.cache.query(from_cache_start, self.end, new_resolution.seconds())?)
            } else {
                Vec::new()
            };
            let mut rendered = filler;
            rendered.extend(from_cache);
            self.respond_ui(rendered, new_start, self.end, new_resolution);

            for (s, e, _) in &missing {
                self.request_data(*s, *e, new_resolution).await;
            }
        }

        self.start = new_start;
        self.cur_tid += 1;
        Ok(())
    }

    /// Moves the right edge of the window. Mirror image of [`Self::set_start`];
    /// placeholders are appended rather than prepended.
    pub async fn set_end(&mut self, new_end: i64) -> Result<()> {
        if new_end == self.end {
            return Ok(());
        }
        let new_resolution = resolution_for((new_end - self.start).abs())?;
        let missing = self.cache.missing_ranges(self.start, new_end, new_resolution)?;

        if missing.is_empty() {
            let samples = as_optional(self.cache.query(self.start, new_end, new_resolution.seconds())?);
            self.respond_ui(samples, self.start, new_end, new_resolution);
        } else {
            let filler_len = num_datapoints((new_end - self.end).max(0), Some(new_resolution))? as usize;
            let filler = vec![None; filler_len];
            let from_cache_end = self.end.min(new_end);
            let from_cache = if self.start < from_cache_end {
                as_optional(self.cache.query(self.start, from_cache_end, new_resolution.seconds())?)
            } else {
                Vec::new()
            };
            let mut rendered = from_cache;
            rendered.extend(filler);
            self.respond_ui(rendered, self.start, new_end, new_resolution);

            for (s, e, _) in &missing {
                self.request_data(*s, *e, new_resolution).await;
            }
        }

        self.end = new_end;
        self.cur_tid += 1;
        Ok(())
    }

    /// Synchronous callback for a backend reply. Always merges into the
    /// cache; only re-renders if the reply is still topical — `cur_tid <=
    /// data_tid + 1` — so an out-of-order late reply can't clobber a newer
    /// view.
    pub fn receive(&mut self, start: i64, end: i64, resolution: Resolution, data: Vec<f64>) -> Result<()> {
        let data_tid = match self.backend_reqs.get(&req_key(start, end, resolution)) {
            Some(tid) => *tid,
            None => {
                log::debug!("receive: dropping reply for unknown request [{start}, {end}) @ {resolution}");
                return Ok(());
            }
        };

        self.cache.merge(start, end, resolution, data)?;

        if self.cur_tid <= data_tid + 1 {
            let (req_start, req_end, req_res) = self.ui_reqs[&data_tid];
            let samples = as_optional(self.cache.query(req_start, req_end, req_res)?);
            self.record_ui_req(data_tid, (req_start, req_end, req_res));
            self.ui.render(samples);
        } else {
            log::debug!(
                "receive: absorbing data but not rendering (cur_tid={}, data_tid={})",
                self.cur_tid,
                data_tid
            );
        }

        Ok(())
    }
}

fn as_optional(samples: Vec<f64>) -> Vec<Option<f64>> {
    samples.into_iter().map(Some).collect()
}
