// src/viewer.rs
use eframe::egui as eg;
use tracing::{info, warn};

use crate::pictures::gfx::{EguiDevice, EguiTexture};
use crate::pictures::Picture;

/// Single-picture window; loads through the regular `Picture::load` path onto egui textures.
pub struct ViewerApp {
    picture: Picture,
    file: String,
    width: u32,
    height: u32,
    device: Option<EguiDevice>,
    texture: Option<EguiTexture>,
    failed: bool,
}

impl ViewerApp {
    pub fn new(picture: Picture, file: String, width: u32, height: u32) -> Self {
        Self {
            picture,
            file,
            width,
            height,
            device: None,
            texture: None,
            failed: false,
        }
    }

    fn ensure_loaded(&mut self, ctx: &eg::Context) {
        if self.texture.is_some() || self.failed {
            return;
        }
        let device = self
            .device
            .get_or_insert_with(|| EguiDevice::new(ctx.clone()));
        match self.picture.load(device, &self.file, self.width, self.height) {
            Some(texture) => {
                let info = self.picture.info();
                info!(
                    "viewer: {} loaded {}x{} (original {}x{})",
                    self.file, info.width, info.height, info.original_width, info.original_height
                );
                self.texture = Some(texture);
            }
            None => {
                warn!("viewer: could not load {}", self.file);
                self.failed = true;
            }
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &eg::Context, _frame: &mut eframe::Frame) {
        self.ensure_loaded(ctx);

        eg::TopBottomPanel::bottom("status").show(ctx, |ui| {
            let info = self.picture.info();
            if self.failed {
                ui.label(format!("Failed to load {}", self.file));
            } else {
                ui.label(format!(
                    "{}  {}x{}  (original {}x{})",
                    self.file, info.width, info.height, info.original_width, info.original_height
                ));
            }
        });

        eg::CentralPanel::default().show(ctx, |ui| {
            let Some(handle) = self.texture.as_ref().and_then(|t| t.handle()) else {
                return;
            };
            // the texture may be padded past the picture; show only the picture area
            let info = self.picture.info();
            let [tw, th] = handle.size();
            let uv = eg::Rect::from_min_max(
                eg::pos2(0.0, 0.0),
                eg::pos2(
                    info.width as f32 / tw.max(1) as f32,
                    info.height as f32 / th.max(1) as f32,
                ),
            );
            let sized = eg::load::SizedTexture::new(
                handle.id(),
                eg::vec2(info.width as f32, info.height as f32),
            );
            ui.centered_and_justified(|ui| {
                ui.add(eg::Image::from_texture(sized).uv(uv).shrink_to_fit());
            });
        });
    }
}
