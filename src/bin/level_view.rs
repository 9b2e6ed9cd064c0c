//! Headless walk-through of a generated test level.
//!
//! Builds a lit room with a pool, a sky ceiling and a flame throwing
//! sparks, renders a
//! number of frames into the recording backend and logs what was drawn.
//! `--show-atlas` opens a window with the packed lightmaps.
//!
//! ```bash
//! cargo run --release --bin level_view -- --frames 40 --show-atlas
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Parser;
use glam::Vec3;
use log::{LevelFilter, debug, info};
use minifb::{Key, Window, WindowOptions};

use glquake_rs::RendererConfig;
use glquake_rs::engine::FrameRenderer;
use glquake_rs::renderer::recorder::Recorder;
use glquake_rs::renderer::{PassKind, RenderContext};
use glquake_rs::world::alias::{AliasFrame, AliasModel, AliasSkin, StVert, TriVertex, Triangle};
use glquake_rs::world::builder::{FaceLight, LevelBuilder, box_faces};
use glquake_rs::world::{
    BspLevel, Child, ClientState, Contents, DynamicLight, Entity, EntityModel, LightStyle,
    MipTexture, Palette, Particle, Plane,
};

const W: usize = 640;
const H: usize = 480;
const ROOM: Vec3 = Vec3::new(512.0, 512.0, 256.0);
const FLAME: Vec3 = Vec3::new(400.0, 256.0, 0.0);

/// CLI options handled via `clap` derive.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Opts {
    /// Frames to render (0.1 s of client time each)
    #[arg(long, default_value_t = 20)]
    frames: usize,

    /// Horizontal field of view in degrees
    #[arg(long, default_value_t = 90.0)]
    fov: f32,

    /// Log every draw call
    #[arg(short, long)]
    verbose: bool,

    /// Show the lightmap atlas in a window at the end
    #[arg(long)]
    show_atlas: bool,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    simplelog::TermLogger::init(
        if opts.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        simplelog::ConfigBuilder::new()
            .set_target_level(LevelFilter::Off)
            .set_location_level(LevelFilter::Off)
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let level = build_level().context("building the test level")?;
    let models = [flame()];
    let config = RendererConfig {
        fov_x: opts.fov,
        ..RendererConfig::default()
    };

    let mut ctx = RenderContext::new(Recorder::default(), W, H);
    let mut frame = FrameRenderer::new_map(&mut ctx, &level, &models, &Palette::default(), config)?;
    let mut client = client_state();

    for i in 0..opts.frames {
        client.time = i as f64 * 0.1;
        client.view_angles.y = i as f32 * 9.0;
        client.particles = sparks(client.time);
        frame.render_view(&mut ctx, &level, &client)?;

        let draws = ctx.gpu.take_draws();
        // pass -> (draws, primitives)
        let mut per_pass: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for d in &draws {
            let (name, primitives) = match d.pass {
                PassKind::Default => ("default", d.indices.len() / 3),
                PassKind::Sky => ("sky", d.indices.len() / 3),
                PassKind::Particle => ("particle", d.indices.len()),
            };
            let entry = per_pass.entry(name).or_default();
            entry.0 += 1;
            entry.1 += primitives;
            debug!("{d:?}");
        }
        info!(
            "frame {i:3}  yaw {:5.1}  {} draws  {per_pass:?}  {} visible entities",
            client.view_angles.y,
            draws.len(),
            frame.level().visible_entities().len()
        );
    }

    if opts.show_atlas {
        let lightmap = frame
            .level()
            .buffers()
            .map(|b| b.lightmap)
            .context("level has no lightmap")?;
        let (desc, mips) = &ctx.gpu.textures[&lightmap];
        let mut win = Window::new("lightmap atlas", desc.width, desc.height, WindowOptions::default())?;
        win.set_target_fps(30);
        while win.is_open() && !win.is_key_down(Key::Escape) {
            win.update_with_buffer(&mips[0], desc.width, desc.height)?;
        }
    }
    Ok(())
}

/// Room with a flickering floor, a pool, lit walls and a sky ceiling.
fn build_level() -> anyhow::Result<BspLevel> {
    let mut b = LevelBuilder::new();
    let floor_tex = b.add_texture(MipTexture::solid("floor", 64, 64, 80));
    let wall_tex = b.add_texture(MipTexture::solid("wall", 64, 64, 96));
    let water_tex = b.add_texture(MipTexture::solid("*water", 64, 64, 200));
    let sky_tex = b.add_texture(MipTexture::solid("sky1", 128, 64, 240));

    let faces = box_faces(Vec3::ZERO, ROOM);
    let pool = box_faces(Vec3::new(192.0, 192.0, 8.0), Vec3::new(320.0, 320.0, 64.0))[0];

    let floor = b.add_face(&faces[0], floor_tex, FaceLight::Uniform(&[(0, 160), (1, 64)]))?;
    let water = b.add_face(&pool, water_tex, FaceLight::Unlit)?;
    let ceiling = b.add_face(&faces[1], sky_tex, FaceLight::Unlit)?;
    let walls = faces[2..]
        .iter()
        .map(|q| b.add_face(q, wall_tex, FaceLight::Uniform(&[(0, 120)])))
        .collect::<Result<Vec<_>, _>>()?;

    let mut marks = vec![floor, water, ceiling];
    marks.extend(&walls);
    let room = b.add_leaf(Contents::Empty, &marks);
    b.set_visibility(room, &[room]);

    // innermost first: north, south, east, west, ceiling, then floor (+ pool)
    let splits = [
        (Plane::new(Vec3::Y, ROOM.y), true, walls[3]..walls[3] + 1),
        (Plane::new(Vec3::Y, 0.0), false, walls[2]..walls[2] + 1),
        (Plane::new(Vec3::X, ROOM.x), true, walls[1]..walls[1] + 1),
        (Plane::new(Vec3::X, 0.0), false, walls[0]..walls[0] + 1),
        (Plane::new(Vec3::Z, ROOM.z), true, ceiling..ceiling + 1),
        (Plane::new(Vec3::Z, 0.0), false, floor..water + 1),
    ];
    let mut next = Child::Leaf(room);
    for (plane, inside_is_back, faces) in splits {
        let children = if inside_is_back {
            [Child::Leaf(0), next]
        } else {
            [next, Child::Leaf(0)]
        };
        next = Child::Node(b.add_node(plane, children, faces));
    }

    let mut level = b.finish(next);
    level.name = "testroom".into();
    level.leaves[room].efrags.extend([1, 2]);
    Ok(level)
}

/// A column of sparks rising over the flame, one every 4 units.
fn sparks(time: f64) -> Vec<Particle> {
    let rise = (time * 40.0) as f32 % 64.0;
    (0..16)
        .map(|i| Particle {
            origin: FLAME + Vec3::new(0.0, 0.0, 32.0 + rise + i as f32 * 4.0),
            color: 0xE0 + (i % 8) as u8,
        })
        .collect()
}

/// Four-sided pyramid with a two-pose flicker.
fn flame() -> AliasModel {
    let tv = |x, y, z| TriVertex {
        v: [x, y, z],
        normal: Vec3::Z,
    };
    let pose = |h| vec![tv(0, 0, 0), tv(16, 0, 0), tv(16, 16, 0), tv(0, 16, 0), tv(8, 8, h)];
    let st = |s: i32, t: i32| StVert {
        s: s << 16,
        t: t << 16,
        on_seam: false,
    };
    let tri = |a, b, c| Triangle {
        faces_front: true,
        vertices: [a, b, c],
    };
    AliasModel {
        name: "progs/flame.mdl".into(),
        skin_width: 8,
        skin_height: 8,
        scale: Vec3::ONE,
        scale_origin: Vec3::new(-8.0, -8.0, 0.0),
        skins: vec![AliasSkin::Single(vec![250; 64])],
        st_verts: vec![st(0, 0), st(7, 0), st(7, 7), st(0, 7), st(4, 4)],
        triangles: vec![tri(0, 1, 4), tri(1, 2, 4), tri(2, 3, 4), tri(3, 0, 4)],
        frames: vec![AliasFrame::Group {
            name: "flicker".into(),
            frames: vec![(pose(24), 0.1), (pose(32), 0.2)],
        }],
        mins: Vec3::new(-8.0, -8.0, 0.0),
        maxs: Vec3::new(8.0, 8.0, 32.0),
    }
}

fn client_state() -> ClientState {
    let eye = Vec3::new(256.0, 256.0, 96.0);
    let mut client = ClientState {
        entities: vec![
            Entity {
                model: EntityModel::Brush(0),
                ..Entity::default()
            },
            // the player, never drawn from the inside
            Entity {
                model: EntityModel::Alias(0),
                origin: eye,
                ..Entity::default()
            },
            Entity {
                model: EntityModel::Alias(0),
                origin: FLAME,
                ..Entity::default()
            },
        ],
        view_entity: 1,
        dlights: vec![DynamicLight {
            origin: Vec3::new(400.0, 256.0, 48.0),
            radius: 200.0,
            die: f64::INFINITY,
        }],
        ambient_light: 8,
        view_origin: eye,
        ..ClientState::default()
    };
    client.light_styles[0] = LightStyle::new("m");
    client.light_styles[1] = LightStyle::new("mmnmmommommnonmmonqnmmo");
    client
}
