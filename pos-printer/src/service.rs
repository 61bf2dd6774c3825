//! Print dispatch
//!
//! Resolves a [`PrinterBinding`] to the USB session or the network
//! transport and sends rendered jobs there.

use crate::binding::{PrinterBinding, SinkBindings};
use crate::bitmap::MonoBitmap;
use crate::error::{PrintError, PrintResult};
use crate::escpos::EscPosBuilder;
use crate::label::{self, BlockGlyphs, GlyphRenderer, LabelSpec, tspl};
use crate::network::NetworkTransport;
use crate::receipt::{ReceiptBuilder, ReceiptPayload, test_page};
use crate::settings::{LabelMode, PrinterSettings};
use crate::store::KeyValueStore;
use crate::usb::{UsbSession, WritePlan};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Sink used for receipts without a kitchen station
pub const RECEIPT_SINK: &str = "receipt";

/// Print sink for a receipt: `kitchen:<id>` or [`RECEIPT_SINK`]
pub fn sink_for(payload: &ReceiptPayload) -> String {
    match payload
        .kitchen_id
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        Some(kitchen) => format!("kitchen:{}", kitchen),
        None => RECEIPT_SINK.to_string(),
    }
}

fn label_glyphs(settings: &PrinterSettings) -> Box<dyn GlyphRenderer> {
    #[cfg(feature = "truetype")]
    if let Some(path) = &settings.label_font_path {
        match label::TrueTypeGlyphs::from_file(path) {
            Ok(glyphs) => return Box::new(glyphs),
            Err(e) => warn!(error = %e, "Label font unavailable, using block glyphs"),
        }
    }
    #[cfg(not(feature = "truetype"))]
    if settings.label_font_path.is_some() {
        warn!("Built without TrueType support, using block glyphs");
    }
    Box::new(BlockGlyphs)
}

pub struct PrintService {
    store: Arc<dyn KeyValueStore>,
    usb: Arc<UsbSession>,
    network: NetworkTransport,
    settings: PrinterSettings,
    glyphs: Box<dyn GlyphRenderer>,
}

impl PrintService {
    /// Service configured from the settings in `store`
    pub fn new(store: Arc<dyn KeyValueStore>, usb: Arc<UsbSession>) -> Self {
        let settings = PrinterSettings::load(store.as_ref());
        Self::with_settings(store, usb, settings)
    }

    pub fn with_settings(
        store: Arc<dyn KeyValueStore>,
        usb: Arc<UsbSession>,
        settings: PrinterSettings,
    ) -> Self {
        Self {
            glyphs: label_glyphs(&settings),
            network: NetworkTransport::new(settings.network.clone()),
            store,
            usb,
            settings,
        }
    }

    pub fn settings(&self) -> &PrinterSettings {
        &self.settings
    }

    pub fn usb(&self) -> &Arc<UsbSession> {
        &self.usb
    }

    pub fn bindings(&self) -> SinkBindings<'_> {
        SinkBindings::new(self.store.as_ref())
    }

    /// Send a finished job with receipt chunking
    pub async fn send(&self, binding: &PrinterBinding, data: &[u8]) -> PrintResult<()> {
        self.send_with(binding, data, WritePlan::RECEIPT).await
    }

    #[instrument(skip(self, binding, data), fields(binding = %binding, data_len = data.len()))]
    async fn send_with(
        &self,
        binding: &PrinterBinding,
        data: &[u8],
        plan: WritePlan,
    ) -> PrintResult<()> {
        match binding {
            PrinterBinding::Usb { usb_key } => self.usb.write_to(usb_key, data, plan).await,
            PrinterBinding::Ip { host, port } => {
                let delivery = self.network.send(data, *host, *port).await?;
                debug!(?delivery, "Network job sent");
                Ok(())
            }
            PrinterBinding::None => Err(PrintError::InvalidConfig(
                "Printer is not configured".to_string(),
            )),
        }
    }

    /// Render and print a receipt on the sink its kitchen maps to
    pub async fn print_receipt(&self, payload: &ReceiptPayload) -> PrintResult<()> {
        let sink = sink_for(payload);
        let binding = self.bindings().get(&sink)?;
        let data = ReceiptBuilder::new(self.settings.receipt.clone()).build(payload);
        info!(sink = %sink, items = payload.items.len(), "Printing receipt");
        self.send(&binding, &data).await
    }

    /// Render a label with the configured builder and print it
    ///
    /// Rendering errors (bad barcode, unreadable font) surface before any
    /// I/O.
    pub async fn print_label(&self, binding: &PrinterBinding, spec: &LabelSpec) -> PrintResult<()> {
        let data = match self.settings.label_mode {
            LabelMode::Vector => tspl::encode(&tspl::build_label(spec)?),
            LabelMode::Raster => label::build_raster_label(
                spec,
                self.glyphs.as_ref(),
                &self.settings.raster_options(),
            )?,
        };
        info!(mode = ?self.settings.label_mode, bytes = data.len(), "Printing label");
        self.send_with(binding, &data, self.settings.label_plan).await
    }

    /// Print a monochrome image on a receipt printer, then feed and cut
    pub async fn print_image(&self, binding: &PrinterBinding, image: &MonoBitmap) -> PrintResult<()> {
        let mut b = EscPosBuilder::new(self.settings.receipt.width(), self.settings.receipt.codepage());
        b.raster(image).feed(4).cut();
        self.send(binding, &b.build()).await
    }

    pub async fn print_test_page(&self, binding: &PrinterBinding) -> PrintResult<()> {
        let r = &self.settings.receipt;
        self.send(binding, &test_page(r.width(), r.code_table)).await
    }

    /// Printer init followed by one blank label for gap calibration
    pub async fn calibrate_labels(
        &self,
        binding: &PrinterBinding,
        spec: &LabelSpec,
    ) -> PrintResult<()> {
        let mut commands = tspl::init_commands();
        commands.push_str(&tspl::calibration(spec));
        self.send_with(binding, &tspl::encode(&commands), self.settings.label_plan)
            .await
    }

    pub async fn usb_connected(&self) -> bool {
        self.usb.is_connected().await
    }

    pub async fn bridge_online(&self) -> bool {
        self.network.bridge_online().await
    }
}
