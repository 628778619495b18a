//! Minimal software-rendered walkthrough viewer.
//!
//! ```bash
//! cargo run --release -- <pak0.pak> [maps/start.bsp]
//! ```

use minifb::{Key, Window, WindowOptions};
use std::time::{Duration, Instant};

use yaquake_rs::engine::{RenderBuffer, Renderer};
use yaquake_rs::pak::{Pak, load_brush_model};
use yaquake_rs::world::{Camera, Colormap, Palette, build_gamma_table};

const W: usize = 640;
const H: usize = 480;
const MOVE_SPEED: f32 = 200.0; // units per second
const TURN_SPEED: f32 = 90.0; // degrees per second

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // ─────────── parse CLI ────────────
    let mut args = std::env::args().skip(1);
    let pak_path = args.next().expect("usage: view_sw <pak0.pak> [map path]");
    let map_path = args.next().unwrap_or_else(|| "maps/start.bsp".into());

    // ─────────── load assets ───────────
    let pak = Pak::from_file(&pak_path)?;
    let bsp_bytes = pak
        .read(&map_path)
        .ok_or_else(|| anyhow::anyhow!("{map_path} not found in pack"))?;
    let mut model = load_brush_model(bsp_bytes)?;
    println!(
        "{}: {} surfaces, {} leaves",
        map_path,
        model.surfaces.len(),
        model.leaves.len()
    );

    let palette = match pak.read("gfx/palette.lmp") {
        Some(bytes) => Palette::from_bytes(bytes)?,
        None => Palette::grayscale(),
    };
    let palette = palette.gamma_corrected(&build_gamma_table(1.0));
    let colormap = match pak.read("gfx/colormap.lmp") {
        Some(bytes) => Colormap::from_bytes(bytes)?,
        None => Colormap::grayscale(),
    };

    // ─────────── renderer & camera ───────────
    let mut renderer = Renderer::new(W, H, colormap);
    renderer.set_world(&model);

    let mut camera = Camera::new(glam::vec3(544.6, 290.0, 50.0), glam::vec3(0.0, 0.0, -90.0));
    camera.set_screen(0, 0, W as i32, H as i32, 90.0);

    let mut target = RenderBuffer::new(W, H);
    let mut framebuffer = vec![0u32; W * H];

    let mut win = Window::new(
        "Quake Software Render",
        W,
        H,
        WindowOptions::default(),
    )?;
    win.set_target_fps(60);

    // ────────────────── benchmarking state ──────────────────────────────
    let mut acc_time = Duration::ZERO;
    let mut acc_frames = 0usize;
    let mut last_print = Instant::now();
    let mut last_frame = Instant::now();

    while win.is_open() && !win.is_key_down(Key::Escape) {
        let dt = last_frame.elapsed().as_secs_f32().min(0.1);
        last_frame = Instant::now();

        /* movement --------------------------------------------------------- */
        camera.update_vectors();
        let forward = camera.roty;
        let right = camera.rotx;

        if win.is_key_down(Key::Up) || win.is_key_down(Key::W) {
            camera.position += forward * MOVE_SPEED * dt;
        }
        if win.is_key_down(Key::Down) || win.is_key_down(Key::S) {
            camera.position -= forward * MOVE_SPEED * dt;
        }
        if win.is_key_down(Key::A) {
            camera.position -= right * MOVE_SPEED * dt;
        }
        if win.is_key_down(Key::D) {
            camera.position += right * MOVE_SPEED * dt;
        }
        if win.is_key_down(Key::Left) {
            camera.angles.z -= TURN_SPEED * dt;
        }
        if win.is_key_down(Key::Right) {
            camera.angles.z += TURN_SPEED * dt;
        }
        if win.is_key_down(Key::PageUp) {
            camera.angles.x = (camera.angles.x + TURN_SPEED * dt).min(85.0);
        }
        if win.is_key_down(Key::PageDown) {
            camera.angles.x = (camera.angles.x - TURN_SPEED * dt).max(-85.0);
        }
        camera.angles.z = camera.angles.z.rem_euclid(360.0);

        /* draw ------------------------------------------------------------- */
        let t0 = Instant::now();
        renderer.render_view(&mut model, &mut camera, &mut target, dt)?;

        for (dst, &src) in framebuffer.iter_mut().zip(target.pixels.iter()) {
            *dst = palette.rgb_u32(src);
        }
        acc_time += t0.elapsed();
        acc_frames += 1;

        win.update_with_buffer(&framebuffer, W, H)?;

        if last_print.elapsed() >= Duration::from_secs(3) {
            let avg_ms = acc_time.as_secs_f64() * 1000.0 / acc_frames.max(1) as f64;
            println!("avg render: {:.2} ms  ({:.1} FPS)", avg_ms, 1000.0 / avg_ms);
            acc_time = Duration::ZERO;
            acc_frames = 0;
            last_print = Instant::now();
        }
    }
    Ok(())
}
