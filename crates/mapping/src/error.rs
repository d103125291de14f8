use thiserror::Error;

/// Structural mapping errors.
///
/// Bad data never raises one of these; data problems degrade into warnings
/// on the output. Only a mapping whose shape contradicts its mode fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// A `field_map` mapping carries template text.
    #[error("field_map mapping must not carry a template")]
    TemplateInFieldMap,

    /// A `template` mapping has no template text.
    #[error("template mapping has no template text")]
    MissingTemplate,

    /// A `template` mapping carries field rules.
    #[error("template mapping must not carry field rules")]
    RulesInTemplate,
}
