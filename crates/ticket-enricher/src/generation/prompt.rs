//! Prompt templates for ticket summaries and classifications

/// Placeholder used when a submission carries no environment context
pub const NO_CONTEXT: &str = "Ninguno";

/// Prompt builder for per-ticket generation
pub struct PromptBuilder;

impl PromptBuilder {
    /// Ask for a short technical summary of the ticket
    pub fn build_summary_prompt(ticket: &str) -> String {
        format!(
            r#"Eres un asistente experto en análisis de tickets de soporte de TI.
Resume el siguiente ticket en un máximo de tres frases, en español, indicando el problema principal y las acciones ya realizadas.
Responde únicamente con el resumen, sin encabezados ni listas.

Ticket:
"""
{ticket}
"""

Resumen:"#
        )
    }

    /// Ask for the single best-fitting category of the ticket
    pub fn build_classification_prompt(ticket: &str, context: Option<&str>) -> String {
        let context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(NO_CONTEXT);

        format!(
            r#"Eres un asistente experto en clasificación de tickets de soporte de TI.
Contexto adicional del entorno: {context}

Clasifica el siguiente ticket en una única categoría breve (por ejemplo: "Problema de Hardware", "Problema de Software", "Gestión de Cuentas", "Problema de Red", "Solicitud de Acceso").
Responde únicamente con el nombre de la categoría más adecuada, sin explicaciones.

Ticket:
"""
{ticket}
"""

Categoría:"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_prompt_uses_placeholder_without_context() {
        let prompt = PromptBuilder::build_classification_prompt("VPN caída", None);
        assert!(prompt.contains("Contexto adicional del entorno: Ninguno"));

        let prompt = PromptBuilder::build_classification_prompt("VPN caída", Some("   "));
        assert!(prompt.contains("Contexto adicional del entorno: Ninguno"));
    }

    #[test]
    fn test_classification_prompt_embeds_context_and_ticket() {
        let prompt =
            PromptBuilder::build_classification_prompt("VPN caída", Some("Banca, 3 sedes"));
        assert!(prompt.contains("Contexto adicional del entorno: Banca, 3 sedes"));
        assert!(prompt.contains("\"\"\"\nVPN caída\n\"\"\""));
    }

    #[test]
    fn test_summary_prompt_embeds_ticket() {
        let prompt = PromptBuilder::build_summary_prompt("Impresora sin tóner");
        assert!(prompt.contains("Impresora sin tóner"));
        assert!(prompt.ends_with("Resumen:"));
    }
}
