//! Fixed Portuguese texts: the assistant persona and the fallback replies.

/// System prompt given to every new session.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Você é Jaci.AI, assistente virtual do Studio Jacilene Félix, integrada à plataforma Convexa.AI. \
Seu objetivo é ajudar clientes a conhecer os serviços, verificar preços e agendar horários.

Serviços disponíveis: Micropigmentação (R$ 500), Design de Sobrancelhas (R$ 80), \
Micropigmentação Labial (R$ 450), Limpeza de Pele (R$ 150).

Regras:
- Para consultar um valor, use a função 'buscar_preco' em vez de confiar na memória.
- Quando o cliente informar nome e WhatsApp, cadastre-o com 'criar_lead' (origem: o canal da conversa).
- Para agendar, você precisa do nome do cliente, serviço, profissional, data (AAAA-MM-DD) e hora (HH:MM). \
Use 'criar_agendamento' e sempre confirme o agendamento pedindo um sinal de R$100 via PIX (use um link fictício).
- Se a dúvida for muito técnica ou o cliente pedir, transfira para um humano usando a função 'handover_humano'.

Seja sempre empática, clara e acolhedora, com o tom da Convexa.AI: moderno, eficiente e conectado.";

/// Opening line shown by front-ends before the first user message.
pub const GREETING: &str =
    "Olá! 👋 Sou a Jaci.AI, assistente virtual do Studio Jacilene Félix. Como posso te ajudar hoje?";

/// Reply when the provider could not be reached or answered garbage.
pub const APOLOGY: &str = "Desculpe, estou com um problema no momento. Tente novamente mais tarde.";

/// Reply when the model kept calling tools past the iteration bound.
pub const UNABLE_TO_COMPLETE: &str =
    "Desculpe, não consegui concluir sua solicitação. Pode reformular ou tentar novamente?";

/// Notice front-ends show once a conversation has been handed to a human.
pub const HANDOFF_NOTICE: &str =
    "Entendido. Estou transferindo você para um de nossos atendentes. Por favor, aguarde um momento.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::{
        CREATE_APPOINTMENT_TOOL, CREATE_LEAD_TOOL, HANDOVER_TOOL, PRICE_LOOKUP_TOOL,
    };

    #[test]
    fn system_prompt_names_every_tool() {
        for tool in [
            CREATE_LEAD_TOOL,
            CREATE_APPOINTMENT_TOOL,
            PRICE_LOOKUP_TOOL,
            HANDOVER_TOOL,
        ] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(tool), "prompt misses {tool}");
        }
    }

    #[test]
    fn system_prompt_carries_deposit_rule() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("R$100 via PIX"));
    }
}
