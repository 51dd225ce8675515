use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{self, Color32, RichText, Stroke};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use vault_core::{AssetUrl, ContentStore, StatePublisher, Subscription, SyncEvent, SyncHandle, SyncState};

use crate::router::Route;

const NAVY: Color32 = Color32::from_rgb(10, 25, 47);
const ACCENT: Color32 = Color32::from_rgb(0, 122, 204);

pub struct SiteInit {
    pub runtime: Arc<Runtime>,
    pub publisher: StatePublisher,
    pub updates: Subscription,
    pub sync: SyncHandle,
    pub content: ContentStore,
    pub start: Route,
}

pub struct SiteApp {
    runtime: Arc<Runtime>,
    publisher: StatePublisher,
    updates: Subscription,
    sync: Option<SyncHandle>,
    content: ContentStore,
    route: Route,
    progress: u8,
    // Final state, captured once the vault reports ready.
    synced: Option<SyncState>,
}

impl SiteApp {
    pub fn new(init: SiteInit) -> Self {
        let snapshot = init.updates.snapshot();
        let progress = snapshot.progress;
        let synced = snapshot.ready.then(|| snapshot.clone());
        Self {
            runtime: init.runtime,
            publisher: init.publisher,
            updates: init.updates,
            sync: Some(init.sync),
            content: init.content,
            route: init.start,
            progress,
            synced,
        }
    }

    fn refresh_updates(&mut self) {
        while let Some(event) = self.updates.try_next() {
            match event {
                SyncEvent::Resolved { progress, .. } => {
                    self.progress = progress;
                }
                SyncEvent::Ready {
                    total,
                    local,
                    fallback,
                } => {
                    info!(total, local, fallback, "asset vault ready, mounting router");
                    self.progress = 100;
                    self.synced = Some(self.publisher.state());
                }
            }
        }
    }

    fn setup_theme(&self, ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();
        style.visuals.dark_mode = true;
        style.visuals.panel_fill = NAVY;
        style.visuals.window_fill = NAVY;
        style.visuals.override_text_color = Some(Color32::from_rgb(220, 224, 230));
        style.visuals.selection.bg_fill = Color32::from_rgba_unmultiplied(0, 122, 204, 60);
        style.visuals.selection.stroke = Stroke::new(1.0, ACCENT);
        style.visuals.widgets.active.bg_fill = ACCENT;
        style.spacing.item_spacing = egui::vec2(10.0, 8.0);
        ctx.set_style(style);
    }

    fn draw_loading_overlay(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.35);
                ui.label(RichText::new("VR GLOBAL").size(36.0).strong());
                ui.label(RichText::new("INSTITUTIONAL EXCELLENCE").size(11.0).weak());
                ui.add_space(24.0);
                ui.add(
                    egui::ProgressBar::new(f32::from(self.progress) / 100.0)
                        .desired_width(256.0)
                        .fill(ACCENT),
                );
                ui.label(
                    RichText::new(format!("Syncing Global Assets {}%", self.progress))
                        .monospace()
                        .size(11.0)
                        .color(ACCENT),
                );
            });
        });
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn draw_nav(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("nav").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new("VR GLOBAL").strong().size(18.0));
                ui.separator();
                for route in Route::NAV {
                    let selected = self.route.label() == route.label();
                    if ui.selectable_label(selected, route.label()).clicked() {
                        self.route = *route;
                    }
                }
            });
        });
    }

    fn draw_page(&mut self, ctx: &egui::Context, state: &SyncState) {
        let mut navigate = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(RichText::new(self.route.path()).weak().size(11.0));
            egui::ScrollArea::vertical().show(ui, |ui| match self.route {
                Route::Home => {
                    ui.heading("Featured");
                    for url in &self.content.featured {
                        image_slot(ui, state, url);
                    }
                }
                Route::Team => {
                    for member in &self.content.team {
                        card(ui, &member.name, &member.designation, &member.summary);
                        image_slot(ui, state, &member.image);
                    }
                }
                Route::Services => {
                    for service in &self.content.services {
                        card(ui, &service.title, "", &service.description);
                        if let Some(url) = &service.image_url {
                            image_slot(ui, state, url);
                        }
                    }
                }
                Route::Industries => {
                    for industry in &self.content.industries {
                        card(ui, &industry.name, "", &industry.description);
                        image_slot(ui, state, &industry.image);
                    }
                }
                Route::Blog => {
                    for post in &self.content.blog_posts {
                        card(ui, &post.title, &format!("{} · {}", post.category, post.date), &post.excerpt);
                        image_slot(ui, state, &post.image);
                        if ui.small_button("Read").clicked() {
                            navigate = Some(Route::BlogPost(post.id));
                        }
                    }
                }
                Route::BlogPost(id) => match self.content.blog_post(id) {
                    Some(post) => {
                        if ui.button("← Insights").clicked() {
                            navigate = Some(Route::Blog);
                        }
                        ui.heading(&post.title);
                        image_slot(ui, state, &post.image);
                        ui.label(&post.excerpt);
                    }
                    None => {
                        ui.label(RichText::new("Article not found").weak());
                    }
                },
            });
        });
        if let Some(route) = navigate {
            self.route = route;
        }
    }
}

fn card(ui: &mut egui::Ui, title: &str, subtitle: &str, body: &str) {
    ui.group(|ui| {
        ui.vertical(|ui| {
            ui.label(RichText::new(title).strong().size(16.0));
            if !subtitle.is_empty() {
                ui.label(RichText::new(subtitle).weak().size(12.0));
            }
            ui.label(body);
        });
    });
}

/// Renders where an image is served from: the vault handle when cached,
/// the remote URL otherwise.
fn image_slot(ui: &mut egui::Ui, state: &SyncState, url: &AssetUrl) {
    let src = state.resolve(url.as_str());
    let local = state.mapping.get(url).and_then(|r| r.local());
    ui.horizontal(|ui| {
        match local {
            Some(reference) => {
                ui.label(RichText::new("cached").color(Color32::from_rgb(67, 160, 71)));
                ui.label(RichText::new(format!("{} bytes", reference.bytes().len())).weak());
            }
            None => {
                ui.label(RichText::new("remote").color(Color32::from_rgb(255, 152, 0)));
            }
        }
        ui.label(RichText::new(src).monospace().size(11.0))
            .on_hover_text(url.as_str());
    });
}

impl Drop for SiteApp {
    fn drop(&mut self) {
        if let Some(handle) = self.sync.take() {
            if let Err(e) = self.runtime.block_on(handle.stop()) {
                warn!(error = %e, "asset sync task did not shut down cleanly");
            }
        }
    }
}

impl eframe::App for SiteApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.setup_theme(ctx);
        self.refresh_updates();

        // Readiness gate: nothing is routed until the vault has synced.
        match self.synced.take() {
            None => self.draw_loading_overlay(ctx),
            Some(state) => {
                self.draw_nav(ctx);
                self.draw_page(ctx, &state);
                self.synced = Some(state);
            }
        }
    }
}
