// Script and stylesheet processors
pub mod bundler;
pub mod class_scanner;
pub mod common;
pub mod css_processor;
pub mod js_transformer;
pub mod minifier;
pub mod module_stripper;
pub mod module_syntax;
pub mod script_escaper;
pub mod template_downgrade;
pub mod utilities;

pub use bundler::OxcBundler;
pub use class_scanner::ClassScanner;
pub use css_processor::LightningCssProcessor;
pub use js_transformer::OxcSourceTransformer;
pub use minifier::OxcMinifier;
pub use module_stripper::ModuleMarkerStripper;
pub use script_escaper::ScriptEscaper;
pub use template_downgrade::TemplateDowngradePass;
pub use utilities::UtilityGenerator;
