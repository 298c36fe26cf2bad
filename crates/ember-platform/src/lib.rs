// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! One native window driven in pump mode: the caller owns the loop and asks for
//! events once per frame instead of handing control to winit.

use std::time::Duration;

use ember_render::RenderSize;
use thiserror::Error;
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::window::{Window as NativeWindow, WindowId};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("event loop: {0}")]
    EventLoop(#[from] EventLoopError),

    #[error("window creation failed: {0}")]
    Os(#[from] OsError),

    #[error("event loop exited with code {0} before the window appeared")]
    Exited(i32),
}

pub type ResizeCallback = Box<dyn FnMut(RenderSize)>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Ember".to_owned(),
        }
    }
}

/// Minimized windows either say so or shrink to nothing, depending on the platform.
fn is_iconified(size: RenderSize, minimized: Option<bool>) -> bool {
    minimized.unwrap_or(false) || size.is_zero()
}

struct Handler {
    config: WindowConfig,
    window: Option<NativeWindow>,
    close_requested: bool,
    iconified: bool,
    framebuffer_size: RenderSize,
    on_resize: Option<ResizeCallback>,
    error: Option<OsError>,
}

impl Handler {
    fn resized(&mut self, size: RenderSize, minimized: Option<bool>) {
        self.iconified = is_iconified(size, minimized);
        if size == self.framebuffer_size {
            return;
        }
        debug!(
            width = size.width,
            height = size.height,
            iconified = self.iconified,
            "framebuffer resized"
        );
        self.framebuffer_size = size;
        if let Some(cb) = self.on_resize.as_mut() {
            cb(size);
        }
    }
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = NativeWindow::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(
                self.config.width as f64,
                self.config.height as f64,
            ));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                self.framebuffer_size = RenderSize::new(size.width, size.height);
                info!(
                    title = %self.config.title,
                    width = size.width,
                    height = size.height,
                    "window created"
                );
                self.window = Some(window);
            }
            Err(e) => {
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let minimized = match &self.window {
            Some(w) if w.id() == id => w.is_minimized(),
            _ => return,
        };
        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                self.resized(RenderSize::new(size.width, size.height), minimized);
            }
            _ => {}
        }
    }
}

pub struct Window {
    handler: Handler,
    event_loop: EventLoop<()>,
}

impl Window {
    /// Opens the window and pumps until it exists. `on_resize` runs from inside
    /// `poll_events`/`wait_events` with the new framebuffer size in pixels.
    pub fn create(config: WindowConfig, on_resize: Option<ResizeCallback>) -> Result<Self, PlatformError> {
        let mut event_loop = EventLoop::new()?;
        let mut handler = Handler {
            config,
            window: None,
            close_requested: false,
            iconified: false,
            framebuffer_size: RenderSize::default(),
            on_resize,
            error: None,
        };
        loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut handler);
            if let Some(e) = handler.error.take() {
                return Err(e.into());
            }
            if handler.window.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = status {
                return Err(PlatformError::Exited(code));
            }
        }
        Ok(Self {
            handler,
            event_loop,
        })
    }

    /// Dispatches whatever is queued without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Duration::ZERO);
    }

    /// Blocks for at most `timeout` waiting for events. Used while iconified.
    pub fn wait_events(&mut self, timeout: Duration) {
        self.pump(timeout);
    }

    fn pump(&mut self, timeout: Duration) {
        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(timeout), &mut self.handler)
        {
            debug!(code, "event loop exited");
            self.handler.close_requested = true;
        }
    }

    pub fn should_close(&self) -> bool {
        self.handler.close_requested
    }

    pub fn iconified(&self) -> bool {
        self.handler.iconified
    }

    /// Size in pixels, which is what the swapchain extent is measured in.
    pub fn framebuffer_size(&self) -> RenderSize {
        self.handler.framebuffer_size
    }

    pub fn destroy(mut self) {
        self.handler.window.take();
        info!("window destroyed");
    }
}

impl HasWindowHandle for Window {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.handler
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for Window {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}
