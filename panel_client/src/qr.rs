use qrcode::{render::svg, QrCode};

use crate::error::PanelClientError;

/// Renders a subscription link as an SVG QR code. The SVG string is what gets stored as the client's QR artifact.
pub fn render_qr_svg(link: &str) -> Result<String, PanelClientError> {
    let code = QrCode::new(link.as_bytes()).map_err(|e| PanelClientError::QrError(e.to_string()))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    Ok(image)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_svg_for_a_link() {
        let svg = render_qr_svg("vless://id@host:443?type=tcp#remark").unwrap();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("<svg"));
    }
}
