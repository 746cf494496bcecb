use nu_plugin::{serve_plugin, MsgPackSerializer};
use nu_plugin_topicstate::TopicStatePlugin;

fn main() {
    serve_plugin(&TopicStatePlugin, MsgPackSerializer {})
}
