use std::{env, process, sync::Arc, time::Instant};

use glam::{Mat4, Vec3};
use gltf_renderer::{
    asset::SceneSource,
    renderer::{
        uniform::camera::CameraState, DepthTexture, Renderer, RendererDescriptor,
    },
};
use log::error;
use pollster::FutureExt;
use wgpu::{
    util::{backend_bits_from_env, initialize_adapter_from_env, power_preference_from_env},
    Backends, Device, DeviceDescriptor, Instance, InstanceDescriptor, PowerPreference, PresentMode,
    Queue, RequestAdapterOptions, Surface, SurfaceConfiguration, SurfaceError, TextureUsages,
    TextureViewDescriptor,
};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

const CAMERA_DISTANCE: f32 = 5.0;
const CAMERA_HEIGHT: f32 = 2.0;
const ORBIT_SPEED: f32 = 0.5;

struct State<'a> {
    surface: Surface<'a>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,

    renderer: Renderer,
    depth_texture: DepthTexture,
    start_time: Instant,
}

impl<'a> State<'a> {
    async fn new(window: Arc<Window>, source: &SceneSource) -> Result<Self, String> {
        let size = window.inner_size();
        let instance = Instance::new(InstanceDescriptor {
            backends: backend_bits_from_env().unwrap_or(Backends::all()),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|err| format!("surface creation failed: {}", err))?;
        let adapter = match initialize_adapter_from_env(&instance, Some(&surface)) {
            Some(adapter) => adapter,
            None => instance
                .request_adapter(&RequestAdapterOptions {
                    power_preference: power_preference_from_env().unwrap_or(PowerPreference::None),
                    compatible_surface: Some(&surface),
                    ..Default::default()
                })
                .await
                .ok_or_else(|| "no suitable graphics adapter".to_string())?,
        };
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("Viewer Device"),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|err| format!("device request failed: {}", err))?;
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| "surface reports no texture formats".to_string())?;
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            desired_maximum_frame_latency: 2,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let descriptor = RendererDescriptor::with_builtin_shader(
            source,
            config.format,
            (size.width, size.height),
        );
        let renderer = Renderer::new(&device, source, descriptor)
            .map_err(|err| format!("renderer setup failed: {}", err))?;
        let depth_texture = DepthTexture::new(&device, (size.width, size.height));

        Ok(Self {
            surface,
            device,
            queue,
            config,
            renderer,
            depth_texture,
            start_time: Instant::now(),
        })
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth_texture = DepthTexture::new(&self.device, (new_size.width, new_size.height));
        self.renderer.resize((new_size.width, new_size.height));
    }

    fn update_camera(&mut self) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let aspect = self.config.width as f32 / self.config.height.max(1) as f32;
        let angle = elapsed * ORBIT_SPEED;
        let eye = Vec3::new(
            angle.cos() * CAMERA_DISTANCE,
            CAMERA_HEIGHT,
            angle.sin() * CAMERA_DISTANCE,
        );
        let state = CameraState {
            projection: Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 1000.0),
            view: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
            position: eye,
            time: elapsed,
        };
        self.renderer.update_camera(&self.queue, &state);
    }

    fn render(&mut self, window: &Window) {
        self.update_camera();
        // Reschedule before acquiring, so a failed acquire cannot stall the
        // continuous redraw loop.
        window.request_redraw();

        let output = loop {
            match self.surface.get_current_texture() {
                Ok(output) => break output,
                Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                    self.surface.configure(&self.device, &self.config);
                }
                Err(SurfaceError::OutOfMemory) => {
                    error!("Out of memory when allocating a frame");
                    return;
                }
                Err(SurfaceError::Timeout) => return,
            }
        };
        let texture_view = output.texture.create_view(&TextureViewDescriptor::default());

        self.renderer.render(
            &self.device,
            &self.queue,
            &texture_view,
            self.depth_texture.texture_view(),
        );

        window.pre_present_notify();
        output.present();
    }
}

struct App {
    source: SceneSource,
    state: Option<State<'static>>,
    window: Option<Arc<Window>>,
}

impl App {
    fn new(source: SceneSource) -> Self {
        Self {
            source,
            state: None,
            window: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = self.window.get_or_insert_with(|| {
            Arc::new(
                event_loop
                    .create_window(
                        WindowAttributes::default().with_inner_size(LogicalSize::new(720, 480)),
                    )
                    .expect("Failed to create window"),
            )
        });
        if self.state.is_none() {
            match State::new(window.clone(), &self.source).block_on() {
                Ok(state) => self.state = Some(state),
                Err(err) => {
                    error!("Failed to set up the viewer: {}", err);
                    event_loop.exit();
                    return;
                }
            }
        }
        window.request_redraw();
    }

    fn suspended(&mut self, _: &ActiveEventLoop) {
        self.state = None;
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let (window, state) = match self.window.as_ref().zip(self.state.as_mut()) {
            Some((window, state)) => (window, state),
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => state.render(window),
            WindowEvent::Resized(physical_size) => state.resize(physical_size),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    env_logger::init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("Usage: gltf-renderer <scene.gltf>");
            process::exit(2);
        }
    };
    let source = match SceneSource::from_path(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Failed to load \"{}\": {}", path, err);
            process::exit(1);
        }
    };

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(source);
    event_loop
        .run_app(&mut app)
        .expect("Failed to run the application");
}
