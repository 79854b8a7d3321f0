use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use rayon::prelude::*;

use super::surface::{Color, Surface};
use super::ViewState;

/// Edge length of a map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Base color behind the map image.
const BACKGROUND: Color = [24, 24, 28, 255];
/// Fill for tiles that are still loading or failed to load.
const PLACEHOLDER: Color = [34, 34, 40, 255];

/// Supplies encoded tile images by grid index.
pub trait TileSource: Send + Sync {
    fn fetch(&self, tx: u32, ty: u32) -> Result<Vec<u8>>;
}

/// Tiles cut from the map image, stored as `{root}/{tx}_{ty}.png`.
pub struct DirTileSource {
    root: PathBuf,
}

impl DirTileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TileSource for DirTileSource {
    fn fetch(&self, tx: u32, ty: u32) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{tx}_{ty}.png"));
        std::fs::read(&path).with_context(|| format!("read tile {}", path.display()))
    }
}

/// Tiles served over HTTP as `{base}/{tx}_{ty}.png`.
pub struct HttpTileSource {
    client: reqwest::blocking::Client,
    base: String,
}

impl HttpTileSource {
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

impl TileSource for HttpTileSource {
    fn fetch(&self, tx: u32, ty: u32) -> Result<Vec<u8>> {
        let url = format!("{}/{tx}_{ty}.png", self.base);
        let bytes = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .bytes()?;
        Ok(bytes.to_vec())
    }
}

/// Pick a tile source for a configured tile root (HTTP URL or local
/// directory).
pub fn source_for(tiles_root: &str) -> Result<Arc<dyn TileSource>> {
    if tiles_root.starts_with("http://") || tiles_root.starts_with("https://") {
        Ok(Arc::new(HttpTileSource::new(tiles_root)?))
    } else {
        Ok(Arc::new(DirTileSource::new(tiles_root)))
    }
}

type TileId = (u32, u32);

enum TileResult {
    Loaded { tile: TileId, image: image::RgbaImage },
    Failed { tile: TileId },
}

fn load_one(source: &dyn TileSource, tile: TileId) -> TileResult {
    let decoded = source
        .fetch(tile.0, tile.1)
        .and_then(|bytes| Ok(image::load_from_memory(&bytes)?.to_rgba8()));
    match decoded {
        Ok(image) => TileResult::Loaded { tile, image },
        Err(err) => {
            log::warn!("tile {},{} failed: {err:#}", tile.0, tile.1);
            TileResult::Failed { tile }
        }
    }
}

/// Raster base layer: the static map image, loaded tile by tile.
///
/// Fetch + decode happen on a worker thread (batches decoded in
/// parallel); the render pass requests whatever is missing and draws
/// placeholders until results are pumped back in. A tile that fails to
/// load is not re-requested.
pub struct TileLayer {
    pub visible: bool,
    surface: Surface,
    map_px: (u32, u32),
    cols: u32,
    rows: u32,
    cache: HashMap<TileId, image::RgbaImage>,
    failed: HashSet<TileId>,
    pending: HashSet<TileId>,
    req_tx: Sender<Vec<TileId>>,
    res_rx: Receiver<TileResult>,
}

impl TileLayer {
    pub fn new(map_px: (u32, u32), source: Arc<dyn TileSource>, size: (u32, u32)) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<Vec<TileId>>();
        let (res_tx, res_rx) = mpsc::channel();

        thread::spawn(move || {
            while let Ok(batch) = req_rx.recv() {
                let results: Vec<TileResult> = batch
                    .into_par_iter()
                    .map(|tile| load_one(&*source, tile))
                    .collect();
                for result in results {
                    if res_tx.send(result).is_err() {
                        return;
                    }
                }
            }
        });

        Self {
            visible: true,
            surface: Surface::new(size.0, size.1),
            map_px,
            cols: map_px.0.div_ceil(TILE_SIZE),
            rows: map_px.1.div_ceil(TILE_SIZE),
            cache: HashMap::new(),
            failed: HashSet::new(),
            pending: HashSet::new(),
            req_tx,
            res_rx,
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn ensure_size(&mut self, size: (u32, u32)) {
        if (self.surface.width(), self.surface.height()) != size {
            self.surface = Surface::new(size.0, size.1);
        }
    }

    /// Drain loader results. Returns true if anything arrived.
    pub fn pump(&mut self) -> bool {
        let mut any = false;
        while let Ok(result) = self.res_rx.try_recv() {
            any = true;
            match result {
                TileResult::Loaded { tile, image } => {
                    self.pending.remove(&tile);
                    self.cache.insert(tile, image);
                }
                TileResult::Failed { tile } => {
                    self.pending.remove(&tile);
                    self.failed.insert(tile);
                }
            }
        }
        any
    }

    /// Draw the visible tiles for `state`, requesting any that are not
    /// yet loaded. Returns true when every visible tile is resolved
    /// (drawn from cache, or terminally failed).
    pub fn render(&mut self, state: &ViewState) -> bool {
        self.surface.fill(BACKGROUND);

        if self.cols == 0 || self.rows == 0 {
            return true;
        }

        let (w, h) = state.size;
        let res = state.resolution;
        // viewport origin in map-image pixel space (y down)
        let px0 = state.center.x - w as f64 / 2.0 * res;
        let py0 = -state.center.y - h as f64 / 2.0 * res;
        let px1 = px0 + w as f64 * res;
        let py1 = py0 + h as f64 * res;

        let ts = TILE_SIZE as f64;
        let t0x = ((px0 / ts).floor() as i64).clamp(0, self.cols as i64 - 1) as u32;
        let t1x = ((px1 / ts).floor() as i64).clamp(0, self.cols as i64 - 1) as u32;
        let t0y = ((py0 / ts).floor() as i64).clamp(0, self.rows as i64 - 1) as u32;
        let t1y = ((py1 / ts).floor() as i64).clamp(0, self.rows as i64 - 1) as u32;

        let mut resolved = true;
        let mut wanted: Vec<TileId> = Vec::new();

        for ty in t0y..=t1y {
            for tx in t0x..=t1x {
                let tile_w = TILE_SIZE.min(self.map_px.0 - tx * TILE_SIZE);
                let tile_h = TILE_SIZE.min(self.map_px.1 - ty * TILE_SIZE);
                let ox = (tx * TILE_SIZE) as f64;
                let oy = (ty * TILE_SIZE) as f64;

                // destination rect from tile edges, so adjacent tiles
                // share boundaries without seams
                let dx0 = ((ox - px0) / res).floor() as i64;
                let dy0 = ((oy - py0) / res).floor() as i64;
                let dx1 = ((ox + tile_w as f64 - px0) / res).floor() as i64;
                let dy1 = ((oy + tile_h as f64 - py0) / res).floor() as i64;
                let dw = (dx1 - dx0).max(1) as u32;
                let dh = (dy1 - dy0).max(1) as u32;

                let tile = (tx, ty);
                if let Some(img) = self.cache.get(&tile) {
                    self.surface.blit_scaled(
                        img.as_raw(),
                        img.width(),
                        img.height(),
                        dx0,
                        dy0,
                        dw,
                        dh,
                    );
                } else if self.failed.contains(&tile) {
                    self.surface.fill_rect(dx0, dy0, dw, dh, PLACEHOLDER);
                } else {
                    self.surface.fill_rect(dx0, dy0, dw, dh, PLACEHOLDER);
                    resolved = false;
                    if !self.pending.contains(&tile) {
                        self.pending.insert(tile);
                        wanted.push(tile);
                    }
                }
            }
        }

        if !wanted.is_empty() {
            // loader thread gone means no tiles will ever arrive; treat
            // the view as resolved rather than waiting forever
            if self.req_tx.send(wanted).is_err() {
                log::error!("tile loader thread is gone");
                self.pending.clear();
                return true;
            }
        }

        resolved && self.pending.is_empty()
    }
}
