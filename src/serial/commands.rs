//! AT command rendering for one SMS submission and the keepalive probe.

use crate::config::DeviceCommands;
use crate::gateway::Message;

/// The four writes that submit one SMS, in order: text mode, submission
/// parameters (carrying the class), destination, body plus terminator.
pub fn sms_submission(commands: &DeviceCommands, message: &Message) -> [Vec<u8>; 4] {
    let class = message.class.digit().to_string();
    let mut body = message.body.clone().into_bytes();
    body.push(commands.terminator);
    [
        commands.text_mode.clone().into_bytes(),
        commands.submit_params.replace("{class}", &class).into_bytes(),
        commands
            .begin_submit
            .replace("{recipient}", &message.recipient)
            .into_bytes(),
        body,
    ]
}

pub fn probe(commands: &DeviceCommands) -> &[u8] {
    commands.probe.as_bytes()
}
