//! Customer-facing texts used when no AI answer is sent.
//!
//! Chosen by the customer's language; anything without a translation here
//! falls back to English.

use clinic_core::language::LanguageCode;

/// Sent when a human will take over the conversation.
pub fn waiting_text(lang: Option<LanguageCode>) -> &'static str {
  match lang {
    Some(LanguageCode::Ko) => "문의 감사합니다. 담당자가 확인 후 곧 답변드리겠습니다. 잠시만 기다려 주세요.",
    Some(LanguageCode::Ja) => "お問い合わせありがとうございます。担当者が確認のうえ、まもなくご返信いたします。少々お待ちください。",
    Some(LanguageCode::Zh) => "感谢您的咨询。工作人员确认后会尽快回复您，请稍候。",
    Some(LanguageCode::ZhTw) => "感謝您的詢問。工作人員確認後會盡快回覆您，請稍候。",
    Some(LanguageCode::Th) => "ขอบคุณสำหรับคำถามของคุณ เจ้าหน้าที่จะตรวจสอบและตอบกลับโดยเร็ว กรุณารอสักครู่",
    Some(LanguageCode::Vi) => "Cảm ơn bạn đã liên hệ. Nhân viên sẽ kiểm tra và phản hồi sớm nhất. Vui lòng chờ trong giây lát.",
    _ => "Thank you for your message. A staff member will review it and reply shortly. Please wait a moment.",
  }
}

/// Sent when processing failed internally. Never includes error details.
pub fn apology_text(lang: Option<LanguageCode>) -> &'static str {
  match lang {
    Some(LanguageCode::Ko) => "죄송합니다. 일시적인 문제로 바로 답변드리지 못했습니다. 담당자가 곧 연락드리겠습니다.",
    Some(LanguageCode::Ja) => "申し訳ございません。一時的な問題によりすぐにお答えできませんでした。担当者より改めてご連絡いたします。",
    Some(LanguageCode::Zh) => "抱歉，由于临时问题暂时无法回复。工作人员会尽快与您联系。",
    Some(LanguageCode::ZhTw) => "抱歉，由於暫時性問題無法立即回覆。工作人員會盡快與您聯繫。",
    Some(LanguageCode::Th) => "ขออภัย เกิดปัญหาชั่วคราวทำให้ไม่สามารถตอบได้ทันที เจ้าหน้าที่จะติดต่อกลับโดยเร็ว",
    Some(LanguageCode::Vi) => "Xin lỗi, do sự cố tạm thời chúng tôi chưa thể trả lời ngay. Nhân viên sẽ liên hệ lại với bạn sớm.",
    _ => "Sorry, we could not answer right away due to a temporary problem. A staff member will contact you shortly.",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_languages_fall_back_to_english() {
    assert_eq!(waiting_text(Some(LanguageCode::Ru)), waiting_text(None));
    assert!(apology_text(None).starts_with("Sorry"));
    assert_ne!(waiting_text(Some(LanguageCode::Ko)), waiting_text(None));
  }
}
