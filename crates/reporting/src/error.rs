use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf rendering failed: {0}")]
    Pdf(String),

    #[error("xlsx rendering failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("unknown report: {0}")]
    UnknownReport(String),
}

impl From<printpdf::Error> for RenderError {
    fn from(value: printpdf::Error) -> Self {
        RenderError::Pdf(value.to_string())
    }
}
