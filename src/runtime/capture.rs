use itertools::Itertools;

use crate::core::protocol::VisualizationArtifact;
use crate::runtime::host::FigureRegistry;
use crate::runtime::marshal::png_data_uri;

/// Owns the figure registry for the duration of one attempt.
///
/// The registry is cleared when the context is finished or dropped, so no
/// figure outlives the attempt that created it, whichever way it ends.
pub struct CaptureContext<'a> {
    registry: &'a mut dyn FigureRegistry,
}

impl<'a> CaptureContext<'a> {
    pub fn new(registry: &'a mut dyn FigureRegistry) -> Self {
        Self { registry }
    }

    /// Renders every open figure in ascending creation order and resets the
    /// registry. A figure that fails to render is skipped.
    pub fn finish(mut self) -> Vec<VisualizationArtifact> {
        let numbers = self.registry.figure_numbers();
        let mut artifacts = Vec::with_capacity(numbers.len());

        for figure in numbers.into_iter().sorted().dedup() {
            match self.registry.render_png(figure) {
                Ok(png) => artifacts.push(VisualizationArtifact {
                    kind: "plot".to_string(),
                    format: "png".to_string(),
                    data: png_data_uri(&png),
                    figure_number: figure,
                }),
                Err(e) => tracing::warn!("Skipping figure: {}", e),
            }
        }

        tracing::debug!("Captured {} visualizations", artifacts.len());
        artifacts
    }
}

impl Drop for CaptureContext<'_> {
    fn drop(&mut self) {
        self.registry.clear();
    }
}
