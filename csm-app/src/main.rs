//! Headless cascaded shadow map demo.
//!
//! Renders a procedural scene through every shadow mode on both submission
//! paths and logs what the cascades settled on.
//!
//! Run with `RUST_LOG=info cargo run --manifest-path csm-app/Cargo.toml`.

use glam::{Mat4, Vec3};
use rein_csm::core::binding::create_layout;
use rein_csm::renderer::shadow::DebugLineRenderer;
use rein_csm::{
    Camera, CascadedShadowMaps, MeshData, MeshGroup, SceneMesh, ShadowMode, ShadowScene,
    ShadowSettings, Texture2D, Viewer, WgpuContext,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAMES_PER_RUN: u32 = 4;
const DEBUG_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Ground plane and a grid of boxes, one part per box.
fn build_level() -> MeshData {
    let mut level = MeshData::plane(Vec3::ZERO, 60.0);
    for x in -5..=5 {
        for z in -5..=5 {
            let height = 0.5 + ((x * 7 + z * 13).rem_euclid(5)) as f32 * 0.6;
            let center = Vec3::new(x as f32 * 6.0, height, z as f32 * 6.0);
            level.append(&MeshData::cuboid(center, Vec3::new(1.0, height, 1.0)));
        }
    }
    level
}

fn character_transform(frame: u32) -> Mat4 {
    let angle = frame as f32 * 0.35;
    Mat4::from_translation(Vec3::new(angle.cos() * 8.0, 0.0, angle.sin() * 8.0))
        * Mat4::from_rotation_y(-angle)
}

struct Demo {
    ctx: WgpuContext,
    camera: Camera,
    shadows: CascadedShadowMaps,
    scene: ShadowScene,
    lines: DebugLineRenderer,
    debug_target: Texture2D,
    frame: u32,
}

impl Demo {
    fn new() -> anyhow::Result<Self> {
        let ctx = WgpuContext::new_blocking(None)?;
        log::info!("{ctx:?}");

        let camera = Camera::new_perspective(
            Vec3::new(0.0, 8.0, 30.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::Y,
            60.0,
            WIDTH as f32 / HEIGHT as f32,
            0.5,
            250.0,
        );

        let settings = ShadowSettings::default();
        let shadows = CascadedShadowMaps::new(&ctx, &settings, WIDTH, HEIGHT)?;

        let level = SceneMesh::new(&ctx, shadows.batcher(), &build_level(), "level")?;
        let character = SceneMesh::new(
            &ctx,
            shadows.batcher(),
            &MeshData::cuboid(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.4, 1.0, 0.3)),
            "character",
        )?;
        let scene = ShadowScene::new(MeshGroup::new(level, Mat4::IDENTITY))
            .with_character(MeshGroup::new(character, character_transform(0)));

        let lines = DebugLineRenderer::new(&ctx, DEBUG_FORMAT)?;
        let debug_target = Texture2D::new(
            &ctx,
            WIDTH,
            HEIGHT,
            DEBUG_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            Some("cascade debug target"),
        );

        Ok(Self {
            ctx,
            camera,
            shadows,
            scene,
            lines,
            debug_target,
            frame: 0,
        })
    }

    fn run(&mut self, settings: &mut ShadowSettings) -> anyhow::Result<()> {
        if self.shadows.apply_settings(&self.ctx, settings)? {
            log::info!("reallocated shadow resources for {:?}", settings.shadow_mode);
        }

        // What a compositor would bind to sample these shadows.
        let resources = self.shadows.resources();
        let layout = create_layout(&self.ctx, "shadow compositor layout", &resources.layout_entries());
        let _compositor = resources.create_bind_group(&self.ctx, &layout);
        log::debug!(
            "reduction pyramid has {} levels",
            self.shadows.reducer().level_count()
        );

        for _ in 0..FRAMES_PER_RUN {
            self.frame += 1;
            if let Some(character) = self.scene.character.as_mut() {
                character.world = character_transform(self.frame);
            }

            let mut encoder = self.ctx.create_encoder(Some("shadow frame"));
            let frame = self.shadows.render(
                &self.ctx,
                &mut encoder,
                &self.scene,
                &self.camera,
                settings,
            )?;

            if settings.visualize_cascades {
                self.lines.update(
                    &self.ctx,
                    self.shadows.debug_lines(),
                    self.camera.view_projection_matrix(),
                );
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("cascade debug lines"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: self.debug_target.view(),
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
                self.lines.draw(&mut pass);
            }

            self.ctx.submit(Some(encoder.finish()));

            log::info!(
                "{:?} gpu={} frame {}: depth [{:.3}, {:.3}] splits {:?} draws {:?}",
                settings.shadow_mode,
                settings.gpu_scene_submission,
                self.frame,
                frame.depth_range.min,
                frame.depth_range.max,
                frame.cascades.splits,
                frame.draws,
            );
            if frame.blur.iter().any(Option::is_some) {
                log::debug!("blur {:?}", frame.blur);
            }
        }

        if settings.gpu_scene_submission {
            let output = self.shadows.setup().read_back(&self.ctx)?;
            log::info!("GPU cascade split depths {:?}", output.split_depths);
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut demo = Demo::new()?;

    for mode in ShadowMode::ALL {
        for gpu_scene_submission in [false, true] {
            let mut settings = ShadowSettings {
                shadow_mode: mode,
                gpu_scene_submission,
                auto_compute_depth_bounds: true,
                stabilize_cascades: true,
                filter_size: 4.0,
                visualize_cascades: mode == ShadowMode::FixedSizePcf,
                light_direction: Vec3::new(0.4, 1.0, 0.6),
                ..Default::default()
            };
            demo.run(&mut settings)?;
        }
    }
    Ok(())
}
