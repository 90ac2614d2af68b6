use anyhow::{Context, Result};
use smithay_client_toolkit::{
    compositor::{CompositorState, Region},
    output::OutputState,
    registry::RegistryState,
    shell::{
        WaylandSurface,
        wlr_layer::{Anchor, KeyboardInteractivity, Layer, LayerShell, LayerSurface},
    },
    shm::{Shm, slot::SlotPool},
};
use wayland_client::{QueueHandle, globals::GlobalList, protocol::wl_output::WlOutput};

use crate::app::App;
use crate::config::{Config, PositionMode};

/// Initial slot pool size; the pool grows on demand once surfaces report
/// their real dimensions.
const INITIAL_POOL_BYTES: usize = 256 * 256 * 4;

pub struct Wayland {
    pub registry_state: RegistryState,
    pub output_state: OutputState,
    pub shm: Shm,
    pub pool: SlotPool,
    pub compositor: CompositorState,
    pub layer_shell: LayerShell,
    pub exit: bool,
}

impl Wayland {
    pub fn new(globals: &GlobalList, qh: &QueueHandle<App>) -> Result<Self> {
        let shm = Shm::bind(globals, qh).context("wl_shm not available")?;

        Ok(Self {
            registry_state: RegistryState::new(globals),
            output_state: OutputState::new(globals, qh),
            pool: SlotPool::new(INITIAL_POOL_BYTES, &shm).context("shm slot pool")?,
            shm,
            compositor: CompositorState::bind(globals, qh).context("wl_compositor not available")?,
            layer_shell: LayerShell::bind(globals, qh).context("layer shell not available")?,
            exit: false,
        })
    }

    /// One overlay surface on `output` (or the compositor's pick for None):
    /// top layer, stretched over the whole output, click-through via an
    /// empty input region, and margins carrying any custom x/y offset.
    pub fn create_overlay_surface(
        &self,
        qh: &QueueHandle<App>,
        output: Option<&WlOutput>,
        config: &Config,
    ) -> Result<LayerSurface> {
        let surface = self.compositor.create_surface(qh);
        let layer = self.layer_shell.create_layer_surface(
            qh,
            surface,
            Layer::Overlay,
            Some("intime"),
            output,
        );

        layer.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
        layer.set_size(0, 0);
        layer.set_exclusive_zone(-1);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);

        if config.position_mode == PositionMode::Custom {
            let left = config.position_x.unwrap_or(0);
            let top = config.position_y.unwrap_or(0);
            layer.set_margin(top, 0, 0, left);
        }

        // Empty input region: every pointer event passes through.
        let region = Region::new(&self.compositor).context("input region")?;
        layer
            .wl_surface()
            .set_input_region(Some(region.wl_region()));

        layer.commit();
        Ok(layer)
    }
}
